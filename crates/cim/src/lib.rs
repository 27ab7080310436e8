//! CIM market documents.
//!
//! The hub speaks CIM JSON: one top-level document name wrapping a header
//! and an array of `MktActivityRecord` transactions. This crate builds and
//! parses those envelopes; it knows nothing about transport or persistence.
//! DataHub validates field-for-field on ingest, so the shapes here are
//! exact.

pub mod document;
pub mod envelope;

pub use {
    document::DocumentType,
    envelope::{Envelope, EnvelopeBuilder, MktActivityRecord},
};

/// Coding schemes fixed by the hub.
pub mod scheme {
    /// GLN market participant codes.
    pub const GLN: &str = "A10";
    /// Danish grid area codes.
    pub const GRID_AREA: &str = "NDK";
    /// CPR customer ids.
    pub const CPR: &str = "ARR";
    /// CVR customer ids.
    pub const CVR: &str = "VA";
}

/// The electricity business sector code carried in every header.
pub const BUSINESS_SECTOR: &str = "23";
