//! CLI support for subcommands that talk to a running daemon.

pub mod client;
