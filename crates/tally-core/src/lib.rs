//! Tally Core Library
//!
//! Shared functionality for the Tally reconciliation tool:
//! - Database access and migrations
//! - Receipt-to-transaction matching engine
//! - CSV import with column-mapping profiles
//! - Payment-provider feed sync
//! - CSV and gzipped-JSON export

pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod matching;
pub mod models;
pub mod sources;

pub use db::{AuditEntry, Database};
pub use error::{Error, Result};
pub use import::{ImportProfile, ImportReport};
pub use matching::{MatchCandidate, MatchEngine, MatchScore, AUTO_MATCH_THRESHOLD};
pub use sources::ProviderClient;
