//! novella-context: best-effort assembly of supporting context for a prompt.

pub mod assembler;
mod error;
pub mod memory;
pub mod sources;
pub mod types;

pub use assembler::{ContextAssembler, ContextSettings};
pub use error::ContextError;
pub use memory::{MemoryNovelStore, NovelData, UnavailableIndex};
pub use sources::{EntityMatch, NovelStore, RetrievalIndex, SummaryMatch};
pub use types::{
    linked_character_count, ChapterSummary, ContextBundle, ContextQuery, EntityCard, LinkedChapter,
};
