//! novella-records: persisted generation records and their sinks.

mod error;
pub mod record;
pub mod store;

pub use error::RecordError;
pub use record::{sanitize, GenerationRecord, PromptInputs};
pub use store::{JsonlRecordStore, MemoryRecordSink, RecordSink};
