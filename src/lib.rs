//! Send one prompt to several language-model providers and collect each
//! answer as it arrives.

/// CLI subcommand implementations.
pub mod commands;
/// Config file, target list and credential resolution.
pub mod config;
/// Concurrent per-target dispatch and outcome collection.
pub mod fanout;
/// Bounded prompt history persisted as JSON.
pub mod history;
/// Tracing subscriber setup for the binaries.
pub mod logging;
/// Endpoint kinds, payloads and the HTTP transport.
pub mod providers;
/// Local HTTP server exposing history and compare routes.
pub mod server;

/// Version line printed by `--version`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("MC_GIT_SHA"),
    "\nbuilt: ",
    env!("MC_BUILD_TS"),
);
