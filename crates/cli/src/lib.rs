//! Operator tooling around `specedit-core`: configuration persistence,
//! logging setup and the offline simulation driver.

pub mod config;
pub mod logging;
pub mod simulate;
pub mod stop;
