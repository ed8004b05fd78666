//! Core library for the imagery intelligence pipeline: typed warehouse
//! tables, filtering, result caching, presentation adapters, analyst
//! conversations, CSV export, and image classification.

pub mod analyst;
pub mod cache;
pub mod classify;
pub mod export;
pub mod filter;
pub mod records;
pub mod types;
pub mod views;

pub use analyst::{
    AnalystReply, AnalystRequest, AnalystResponse, ContentBlock, Conversation, ConversationState,
    Message, Role, Turn, TurnOutcome,
};
pub use cache::ResultCache;
pub use classify::{ClassificationReport, ImageClassifier, ModelKind, Prediction, Preprocessing};
pub use export::{records_to_csv, table_to_csv, ExportKind};
pub use filter::{DateRange, FilterColumns, FilterCriteria, Filterable};
pub use records::{decode, DailySummary, Decoded, ImageRecord, Record, SpatialMetric};
pub use types::*;
pub use views::QualityBands;
