//! Tally - a lightweight page-view analytics engine
//!
//! Records per-page-view telemetry for one or more sites and serves
//! aggregated statistics to an authenticated dashboard:
//! - Unauthenticated collect endpoint for instrumented pages
//! - Shared-secret guarded stats snapshot (totals, uniques, rankings, feed)
//! - Append-only SQLite visit log, aggregates computed on demand

pub mod config;
pub mod db;
pub mod geoip;
pub mod web;
