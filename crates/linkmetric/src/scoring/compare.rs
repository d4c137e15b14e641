//! Section-by-section delta between two persisted attempts of the same
//! customer. Output order is always the canonical 12-section order, never
//! influenced by delta magnitude.

use super::invoker::ScoreRecord;
use super::section::Section;
use crate::pipeline::domain::{AttemptId, CustomerId};
use crate::store::{AnalysisStore, StoreError};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDirection {
    Improved,
    Declined,
    Unchanged,
}

impl ChangeDirection {
    fn from_delta(delta: i16) -> Self {
        match delta {
            d if d > 0 => ChangeDirection::Improved,
            d if d < 0 => ChangeDirection::Declined,
            _ => ChangeDirection::Unchanged,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionDelta {
    pub section: Section,
    pub current_score: u8,
    pub previous_score: u8,
    pub delta: i16,
    pub change_direction: ChangeDirection,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub customer_id: CustomerId,
    pub current_attempt: AttemptId,
    pub previous_attempt: AttemptId,
    pub current_final_score: u8,
    pub previous_final_score: u8,
    pub overall_delta: i16,
    pub sections: Vec<SectionDelta>,
}

#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("attempts are not comparable: {0}")]
    AttemptNotComparable(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Compare two attempts' score records. Both must belong to the same customer
/// and both must have a persisted score record.
pub fn compare(
    store: &dyn AnalysisStore,
    current_id: AttemptId,
    previous_id: AttemptId,
) -> Result<ComparisonResult, CompareError> {
    if current_id == previous_id {
        return Err(CompareError::AttemptNotComparable(
            "cannot compare an attempt with itself".to_string(),
        ));
    }

    let current = score_record(store, current_id)?;
    let previous = score_record(store, previous_id)?;

    if current.customer_id != previous.customer_id {
        return Err(CompareError::AttemptNotComparable(format!(
            "attempts belong to different customers ({} vs {})",
            current.customer_id, previous.customer_id
        )));
    }

    let sections = Section::ordered()
        .into_iter()
        .map(|section| {
            // build_record guarantees all twelve sections are present.
            let current_score = current.section_score(section).unwrap_or(0);
            let previous_score = previous.section_score(section).unwrap_or(0);
            let delta = i16::from(current_score) - i16::from(previous_score);
            SectionDelta {
                section,
                current_score,
                previous_score,
                delta,
                change_direction: ChangeDirection::from_delta(delta),
            }
        })
        .collect();

    let overall_delta = i16::from(current.final_score) - i16::from(previous.final_score);

    Ok(ComparisonResult {
        customer_id: current.customer_id.clone(),
        current_attempt: current_id,
        previous_attempt: previous_id,
        current_final_score: current.final_score,
        previous_final_score: previous.final_score,
        overall_delta,
        sections,
    })
}

fn score_record(store: &dyn AnalysisStore, id: AttemptId) -> Result<ScoreRecord, CompareError> {
    store
        .score_record(&id)?
        .ok_or_else(|| CompareError::AttemptNotComparable(format!("attempt {id} has no score record")))
}
