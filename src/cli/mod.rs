pub mod commands;

pub use commands::{ChatArgs, Cli, Commands};
