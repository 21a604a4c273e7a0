pub mod coordinator;
pub mod correction_ctx;

pub use coordinator::Coordinator;
pub use correction_ctx::{CorrectionCtx, CorrectionJob, CorrectionOutcome};
