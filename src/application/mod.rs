//! Application layer - wiring, the scan loop and the CLI

pub mod commands;
pub mod scanner;
pub mod services;

pub use commands::{Cli, CommandExecutor, Commands};
pub use scanner::{ScanTarget, Scanner};
pub use services::{AppServices, ChainServices};
