//! Warehouse loading, the external transform hand-off, and the pipeline
//! orchestrator.

pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod transform;
pub mod warehouse;

pub use error::{LoaderError, TransformError};
pub use loader::{parse_message_entry, WarehouseLoader};
pub use orchestrator::{
    ChannelReport, DetectionStageReport, PipelineOrchestrator, PipelineReport, PipelineSettings,
    PipelineState, TransformOutcome,
};
pub use transform::{CommandTransform, Transform};
pub use warehouse::{MemoryWarehouse, PgWarehouse, Warehouse};
