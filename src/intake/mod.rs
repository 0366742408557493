//! Record extraction: normalization, block grouping, field validation,
//! in-message deduplication and result assembly.
//!
//! Everything here is synchronous and free of I/O. The only async step,
//! checking against records already stored for the day, lives in
//! [`engine::DuplicateChecker`] behind the store trait.

pub mod blocks;
pub mod card_type;
pub mod date;
pub mod dedupe;
pub mod engine;
pub mod fields;
pub mod normalize;
pub mod policy;
pub mod types;

pub use blocks::{Blocks, StructureError};
pub use engine::{DuplicateChecker, IngestRequest, ingest};
pub use policy::UniquenessPolicy;
pub use types::*;

use regex::Regex;

/// Compile a built-in pattern. Only ever called with literals.
pub(crate) fn pattern(src: &str) -> Regex {
    match Regex::new(src) {
        Ok(re) => re,
        Err(e) => panic!("built-in pattern {src:?} does not compile: {e}"),
    }
}
