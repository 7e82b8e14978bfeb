//! Command-line front end for schemaport.
//!
//! Parses arguments, drives the export pipeline or the gateway from
//! `schemaport-core`, and writes validated schema documents.

pub mod cli;
pub mod output;

pub use cli::{Cli, Command, ExportArgs, GatewayArgs, GlobalArgs};
