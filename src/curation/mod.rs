//! Round-robin curation of followed sources.

mod runner;
mod scheduler;

pub use runner::CurationLoop;
pub use scheduler::{CurationOutcome, CurationSettings, Curator, DEFAULT_SEED_HANDLES};
