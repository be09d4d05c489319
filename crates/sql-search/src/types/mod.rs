//! Request and response types for search.

mod options;
mod result;
pub mod surrogate_id;

pub use options::{SearchOptions, SortParameter, TotalType, UnsupportedParameter};
pub use result::{ResourceWrapper, SearchEntryMode, SearchResult, SearchResultEntry};
