//! Input handling that does not touch the device directly.

pub mod read_loop;
