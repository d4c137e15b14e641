//! Turns a [`ProfileSnapshot`] into a [`ScoreRecord`] via the external
//! scoring capability, then enforces the fixed weighting policy. Partial or
//! out-of-range capability output is rejected outright; a guessed score is
//! never persisted.

use super::section::{Section, SectionStatus, MAX_SECTION_SCORE};
use crate::config::GradePolicy;
use crate::pipeline::domain::{AttemptId, CustomerId, ProfileSnapshot, TargetAudience};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw per-section verdict as returned by the capability, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionAppraisal {
    pub section: Section,
    pub score: u8,
    pub analysis: String,
    #[serde(default)]
    pub ai_rewrite: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Complete raw response from the scoring capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appraisal {
    pub sections: Vec<SectionAppraisal>,
    pub executive_summary: String,
}

#[derive(Debug, thiserror::Error)]
#[error("scoring capability error: {0}")]
pub struct CapabilityError(pub String);

/// Seam to the external scoring capability (prompt/response).
#[async_trait]
pub trait ScoringCapability: Send + Sync {
    async fn appraise(
        &self,
        snapshot: &ProfileSnapshot,
        audience: TargetAudience,
    ) -> Result<Appraisal, CapabilityError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring response missing section {}", .0.label())]
    MissingSection(Section),
    #[error("scoring response repeats section {}", .0.label())]
    DuplicateSection(Section),
    #[error("section {} scored {score}, outside 0-{MAX_SECTION_SCORE}", .section.label())]
    ScoreOutOfRange { section: Section, score: u8 },
    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

/// Validated, weighted section score as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionScore {
    pub section: Section,
    pub score: u8,
    pub max_score: u8,
    pub status: SectionStatus,
    pub analysis: String,
    pub ai_rewrite: Option<String>,
    pub tags: Vec<String>,
}

/// One scoring result per attempt. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub attempt_id: AttemptId,
    pub customer_id: CustomerId,
    pub sections: Vec<SectionScore>,
    pub final_score: u8,
    pub grade_label: String,
    pub executive_summary: String,
    pub top_priorities: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl ScoreRecord {
    pub fn section_score(&self, section: Section) -> Option<u8> {
        self.sections
            .iter()
            .find(|entry| entry.section == section)
            .map(|entry| entry.score)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScoringInvoker {
    grade: GradePolicy,
}

impl ScoringInvoker {
    pub fn new(grade: GradePolicy) -> Self {
        Self { grade }
    }

    /// Call the capability and normalize its output into a [`ScoreRecord`].
    pub async fn invoke(
        &self,
        capability: &dyn ScoringCapability,
        snapshot: &ProfileSnapshot,
        audience: TargetAudience,
        attempt_id: AttemptId,
        customer_id: CustomerId,
    ) -> Result<ScoreRecord, ScoringError> {
        let appraisal = capability.appraise(snapshot, audience).await?;
        self.build_record(appraisal, attempt_id, customer_id)
    }

    /// Validate an appraisal and apply the weighting policy. Fails if any of
    /// the twelve sections is missing, repeated, or scored out of range.
    pub fn build_record(
        &self,
        appraisal: Appraisal,
        attempt_id: AttemptId,
        customer_id: CustomerId,
    ) -> Result<ScoreRecord, ScoringError> {
        let mut sections = Vec::with_capacity(12);

        for section in Section::ordered() {
            let mut found = appraisal
                .sections
                .iter()
                .filter(|entry| entry.section == section);
            let entry = found.next().ok_or(ScoringError::MissingSection(section))?;
            if found.next().is_some() {
                return Err(ScoringError::DuplicateSection(section));
            }
            if entry.score > MAX_SECTION_SCORE {
                return Err(ScoringError::ScoreOutOfRange {
                    section,
                    score: entry.score,
                });
            }

            sections.push(SectionScore {
                section,
                score: entry.score,
                max_score: MAX_SECTION_SCORE,
                status: SectionStatus::from_score(entry.score),
                analysis: entry.analysis.clone(),
                ai_rewrite: entry.ai_rewrite.clone(),
                tags: entry.tags.clone(),
            });
        }

        let final_score = weighted_final_score(&sections);
        let grade_label = self.grade.label(final_score).to_string();
        let top_priorities = top_priorities(&sections);

        Ok(ScoreRecord {
            attempt_id,
            customer_id,
            sections,
            final_score,
            grade_label,
            executive_summary: appraisal.executive_summary,
            top_priorities,
            generated_at: Utc::now(),
        })
    }
}

/// `Σ(section_score / 10 × weight)`, rounded to nearest, clamped to [0, 100].
fn weighted_final_score(sections: &[SectionScore]) -> u8 {
    let sum: f64 = sections
        .iter()
        .map(|entry| f64::from(entry.score) / f64::from(MAX_SECTION_SCORE) * f64::from(entry.section.weight()))
        .sum();
    sum.round().clamp(0.0, 100.0) as u8
}

/// The three sections with the largest unrealized weighted impact
/// `(10 - score)/10 × weight`. Already-optimized sections are skipped unless
/// fewer than three remain; ties fall back to canonical order.
fn top_priorities(sections: &[SectionScore]) -> Vec<String> {
    let impact = |entry: &SectionScore| {
        f64::from(MAX_SECTION_SCORE - entry.score) / f64::from(MAX_SECTION_SCORE)
            * f64::from(entry.section.weight())
    };

    let mut candidates: Vec<&SectionScore> = sections
        .iter()
        .filter(|entry| entry.status != SectionStatus::Optimized)
        .collect();
    if candidates.len() < 3 {
        candidates = sections.iter().collect();
    }

    // Stable sort preserves canonical order among equal impacts.
    candidates.sort_by(|a, b| {
        impact(b)
            .partial_cmp(&impact(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    candidates
        .iter()
        .take(3)
        .map(|entry| format!("Improve {}", entry.section.label()))
        .collect()
}
