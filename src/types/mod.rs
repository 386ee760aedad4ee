//! Type definitions module
//!
//! The invoice record shared by every pipeline stage.

pub mod invoice;

// Re-export commonly used types
pub use invoice::{LineItem, ParsedInvoice, Party};
