pub mod correction_service;
pub mod notifier;
pub mod report_writer;
pub mod score_extractor;

pub use correction_service::{CorrectionEngine, CorrectionService};
pub use notifier::{LogNotifier, Notifier};
pub use report_writer::ReportWriter;
pub use score_extractor::{ExtractedScores, ScoreExtractor};
