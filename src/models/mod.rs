pub mod correction;
pub mod essay;
pub mod loaders;

pub use correction::{CorrectionRequest, CorrectionSource};
pub use essay::{
    Essay, EssayNote, EssayResult, EssayStatus, IndicatorScore, NewEssay, StatusReport, Version,
};
pub use loaders::{load_all_submissions, load_submission, SubmissionFile};
