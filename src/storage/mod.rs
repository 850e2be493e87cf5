mod curated;
mod quotes;
mod schema;
mod sources;
mod types;

pub use curated::REVIEW_PAGE_SIZE;
pub use schema::Database;
pub use types::{
    ContentItem, CuratedItem, CurationState, DatabaseError, MergeOutcome, NewQuote, NewSource,
    Quote, Source,
};
