//! Stitch client for warehouse-sync.
//!
//! Implements [`job_monitor::JobApi`] on top of the Stitch Connect API:
//! a trigger is `POST {host}/sources/{source_id}/sync`, and a job's status
//! is read from the client's extraction list.
//!
//! Stitch does not expose per-job status. A source's most recent extraction
//! is attributed to the handle when it completed at or after the handle's
//! `triggered_at`; an older completion means the triggered run has not
//! finished (or started) yet.

mod client;
mod config;
mod extractions;

pub use client::StitchClient;
pub use config::StitchConfig;
pub use extractions::{
    parse_trigger_response, status_from_extractions, Extraction, ExtractionsResponse,
};
