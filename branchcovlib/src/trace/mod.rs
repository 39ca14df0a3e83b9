//! Trace processing: filter branch records of an lcov-style tracefile.
//!
//! - **Records**: classify each trace line as a section marker (`SF:`),
//!   branch data (`BRDA:`) or an opaque pass-through record
//! - **Filtering**: drop branch data whose source line is not conditional

pub mod filter;
pub mod record;

pub use filter::{filter_tracefile, FilterStats, TraceFilter};
pub use record::{Record, BRANCH_DATA_PREFIX, SOURCE_FILE_PREFIX};
