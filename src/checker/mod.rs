// src/checker/mod.rs
// =============================================================================
// This module contains all link checking logic.
//
// Submodules:
// - transport: Picks direct vs. SOCKS-proxied egress for a URL
// - probe: Checks if one URL is alive (HEAD request with a deadline)
// - engine: Batches and sweeps over the link store, failure counting, pruning
// - job: Wraps a full sweep as a scheduler job
//
// This file (mod.rs) is the module root - it re-exports the public API so
// callers can write `checker::LinkChecker` instead of the full path.
// =============================================================================

mod engine;
mod job;
mod probe;
mod transport;

pub use engine::{BatchResult, CheckerError, CheckerSettings, LinkChecker, SweepResult, UpdateOutcome};
pub use job::{LinkCheckJob, LINK_CHECK_JOB};
pub use probe::{
    CheckResult, HttpProber, ProbeOptions, Prober, DEFAULT_PROXY_ENDPOINT, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT,
};
pub use transport::{is_onion_host, Route, Transport, ONION_SUFFIX};
