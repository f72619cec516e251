use std::io::{self, Write};

use sh_interrupt::core::read_loop::{self, control_name, EndOfInput};
use sh_interrupt::platform::{hold_teardown_signals, signals};
use sh_interrupt::{
    install_panic_restore, logging, CatcherError, EnvConfig, SessionGuard, SESSION,
};

fn main() {
    let config = EnvConfig::from_env();
    logging::init(&config);
    install_panic_restore(&SESSION);

    if config.verbose {
        println!("I'm PID {}", std::process::id());
    }

    let outcome = SESSION.acquire(&config.tty_path).and_then(|session| {
        let outcome = run(&config, &session);
        // From here to exit a terminate signal would overwrite the status with its own.
        hold_teardown_signals();
        drop(session);
        outcome
    });

    let status = match outcome {
        Ok(end) => {
            tracing::debug!(?end, "input ended");
            0
        }
        Err(err) => {
            tracing::error!("{err}");
            config.failure_status(err.exit_code())
        }
    };

    let _ = io::stdout().flush();
    std::process::exit(status);
}

/// Startup sequence and read loop on an acquired session.
fn run(config: &EnvConfig, session: &SessionGuard<'_>) -> Result<EndOfInput, CatcherError> {
    session.snapshot_original_mode()?;

    let pgrp = session.claim_foreground_group()?;
    if config.verbose {
        println!("tty pgrp is {pgrp}");
    }

    // Handlers go in before raw mode so a terminate signal can never find the terminal
    // raw with no one to restore it.
    signals::install()?;
    session.enter_raw_mode()?;
    tracing::info!(device = %config.tty_path.display(), "terminal in raw mode");

    let eof_char = session.eof_char();
    println!(
        "Use C-c and C-g for async actions, end with {}",
        control_name(eof_char)
    );

    let mut stdout = io::stdout();
    read_loop::run(|buf| session.read_byte(buf), eof_char, &mut stdout).into_result()
}
