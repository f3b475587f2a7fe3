//! Host-side device bridges.

pub mod console;
