pub mod curator;
pub mod filter;
pub mod input;

pub use curator::{
    BatchFailure, BatchReport, CuratedModel, CurationReport, Curator, OrganizationLinks, Pruned, RawLink, Skipped,
};
pub use filter::{DomainFilter, LinkCategory, NoiseReason, Verdict};
pub use input::{read_jsonl, LineError, ParsedBatch};
