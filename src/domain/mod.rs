//! Data model for backup runs.
//!
//! Everything here is scoped to a single pipeline invocation; no state
//! crosses run boundaries.

pub mod export;
pub mod outcome;
pub mod package;
pub mod source;

pub use export::{ExportResult, ExportStatus};
pub use outcome::{RunCounters, RunOutcome};
pub use package::{HistoricalPackage, PackageArtifact};
pub use source::DataSourceSpec;
