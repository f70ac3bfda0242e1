pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod orchestrator;
pub mod reporter;
pub mod router;
pub mod stats;
pub mod structure;
pub mod word_count;

pub use backend::{Backend, BackendError, BackendId, BackendRegistry, CompletionRequest, FallbackTable};
pub use config::Config;
pub use document::read_document;
pub use error::AnalysisError;
pub use gateway::{CompletionGateway, RetryPolicy};
pub use llm::HttpBackend;
pub use orchestrator::AnalysisOrchestrator;
pub use reporter::{ReportFormat, Reporter};
pub use router::{AnalysisRouter, TaskConfig};
pub use stats::{RunStatistics, RunSummary, UnitResult};
pub use structure::{AnalysisMode, Level, SegmentationParams, StructuralUnit, StructureExtractor};
pub use word_count::WordCounter;

pub type Result<T> = anyhow::Result<T>;
