//! Task registry, scheduling, processing, scoring, retention and offline separation

pub mod offline;
pub mod pipeline;
pub mod quality_assessor;
pub mod retention;
pub mod scheduler;
pub mod task_store;

pub use offline::{separate_file, SeparationSummary};
pub use pipeline::{Job, ProcessingError, TaskPipeline};
pub use quality_assessor::{QualityAssessment, QualityAssessor, QualityError, ScoringTier};
pub use retention::{RetentionPolicy, RetentionSweeper, SweepReport};
pub use scheduler::{SchedulerError, StorageLayout, TaskScheduler, WorkerPool};
pub use task_store::TaskStore;
