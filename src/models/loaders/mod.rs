pub mod toml_loader;

pub use toml_loader::{load_all_submissions, load_submission, SubmissionFile};
