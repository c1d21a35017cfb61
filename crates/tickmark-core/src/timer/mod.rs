pub mod accrual;
pub mod registry;

pub use accrual::{apply, capped_elapsed, AccrualConfig, Action, TimerState, TimerStatus};
pub use registry::TimerRegistry;
