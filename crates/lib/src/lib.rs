//! Relay core library: `!send` command parsing, dispatch to the routing gateway,
//! and the HTTP surfaces used by the CLI.

pub mod command;
pub mod config;
pub mod dispatch;
pub mod forward;
pub mod server;
