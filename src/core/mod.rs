//! Pipeline stages and orchestration.

pub mod disk;
pub mod distribution;
pub mod export;
pub mod orchestrator;
pub mod packaging;
pub mod retention;

pub use disk::{DiskBudget, DiskBudgetGuard};
pub use distribution::DistributionStage;
pub use export::ExportStageController;
pub use orchestrator::{PipelineOrchestrator, RunSummary, Stage};
pub use packaging::PackagingStage;
pub use retention::{RetentionManager, RetentionReport};
