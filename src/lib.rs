//! Placement application gate for university career services.
//!
//! The engine decides whether a candidate may apply to a job posting (tier
//! resolution plus eligibility rules) and enforces per-tier application
//! quotas through a reserve/commit/release ledger. The workflow modules stay
//! transport-agnostic; HTTP and CLI surfaces live at the edges.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
