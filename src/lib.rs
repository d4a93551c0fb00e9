// src/lib.rs
// =============================================================================
// link-sweeper as a library.
//
// Modules:
// - scheduler: runs named jobs on fixed intervals, never overlapping a job
// - checker: probes links (direct or via SOCKS for .onion) and sweeps the store
// - store: the LinkStore trait and its SQLite implementation
// - import: seeds the store from Markdown / HTML documents
// - service: manual sweep, diagnostic probe, status report
// - config: TOML configuration with defaults and validation
//
// The binary (src/main.rs) is a thin composition root over these.
// =============================================================================

pub mod checker;
pub mod config;
pub mod import;
pub mod scheduler;
pub mod service;
pub mod store;
