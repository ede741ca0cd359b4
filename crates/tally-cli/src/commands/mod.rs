//! Command implementations, organized by domain

mod core;
mod export;
mod import;
mod receipts;
mod shipments;
mod transactions;

pub use core::*;
pub use export::*;
pub use import::*;
pub use receipts::*;
pub use shipments::*;
pub use transactions::*;
