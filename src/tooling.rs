//! Tooling & Integration Layer
//!
//! Command-line entry points for mounting and maintaining a library.

pub mod cli;

pub use cli::{Cli, CliContext, Commands, PlaylistCommands};
