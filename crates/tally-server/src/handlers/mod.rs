//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod audit;
pub mod auth;
pub mod export;
pub mod import;
pub mod receipts;
pub mod shipments;
pub mod transactions;

// Re-export all handlers for use in router
pub use audit::*;
pub use auth::*;
pub use export::*;
pub use import::*;
pub use receipts::*;
pub use shipments::*;
pub use transactions::*;
