//! # Configuration
//!
//! - `controller`: environment-driven controller settings
//! - `cli`: command line flags

pub mod cli;
pub mod controller;

pub use cli::Cli;
pub use controller::ControllerConfig;
