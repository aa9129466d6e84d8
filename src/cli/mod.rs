//! Command-line interface
//!
//! Commands:
//! - `run`: load, publish and mirror a range of periods
//! - `init`: write a sample configuration, then create the control table
//! - `status`: list control records
//! - `validate`: fetch and validate without writing

pub mod commands;
pub mod error;
pub mod logging;
