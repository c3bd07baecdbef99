//! clinai-core: Shared clinical record and search types
//!
//! This crate provides the document model persisted by the record store,
//! the structured search specification produced from free-text queries,
//! and the response bodies returned by the HTTP server.

pub mod error;
pub mod normalize;
pub mod outcome;
pub mod record;
pub mod search;

pub use error::RecordError;
pub use outcome::{ErrorBody, MessageBody};
pub use record::{NOT_AVAILABLE, PatientRecord, Prescription, RecordField, RecordPatch};
pub use search::{DemographicConstraints, RankedCandidate, SearchResponse, SearchSpecification};
