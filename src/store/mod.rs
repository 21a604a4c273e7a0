pub mod error;
pub mod essay_store;

pub use error::{StoreError, StoreResult};
pub use essay_store::{ClaimOutcome, CorrectionClaim, EssayStore, FinalizeOutcome};
