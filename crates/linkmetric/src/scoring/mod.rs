//! Profile scoring: the canonical 12-section model, the invoker that
//! normalizes the external scoring capability's output into a weighted
//! [`ScoreRecord`], and attempt-to-attempt comparison.

pub mod compare;
pub mod invoker;
pub mod section;

pub use compare::{ChangeDirection, CompareError, ComparisonResult, SectionDelta};
pub use invoker::{
    Appraisal, CapabilityError, ScoreRecord, ScoringCapability, ScoringError, ScoringInvoker,
    SectionAppraisal, SectionScore,
};
pub use section::{Section, SectionStatus, MAX_SECTION_SCORE};
