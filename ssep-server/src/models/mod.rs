//! Domain models

pub mod task;

pub use task::{QualityReport, QualityScoreSet, Task, TaskId, TaskStateError, TaskStatus};

/// Round `value` to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
