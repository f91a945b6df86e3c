//! # persistable
//!
//! Command-line front end for `persistable-core`. The binary in `main.rs`
//! only sets up logging and dispatches to [`cli::execute`]; the command
//! implementations live here so they can be tested directly.

pub mod cli;
