use super::step::PipelineStep;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Sequential customer identifier, formatted like `LM-00042`. Issued once by
/// the allocator and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique attempt identifier, generated at intake and independent of
/// the customer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AttemptId {
    type Err = uuid::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(raw).map(Self)
    }
}

/// Audience the analysis is optimized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetAudience {
    Recruiters,
    Clients,
    Investors,
}

impl TargetAudience {
    /// Human phrasing handed to the scoring capability prompt.
    pub fn describe(self) -> &'static str {
        match self {
            TargetAudience::Recruiters => "Recruiters & Hiring Managers at top companies",
            TargetAudience::Clients => "Potential Clients & Business Partners",
            TargetAudience::Investors => "Venture Capitalists & Investors",
        }
    }
}

/// A distinct person, deduplicated by normalized profile URL and secondarily
/// by email. Created on first successful intake; never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: CustomerId,
    pub profile_url: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub total_attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeState {
    Pending,
    Scraping,
    Completed,
    Failed,
}

/// One run of the pipeline. Owned exclusively by the runner while in
/// flight; read-only to everyone else after a terminal step.
///
/// `customer_id` is `None` only for intakes rejected at validation, which
/// freeze in an immediate-failure terminal step before any customer is
/// allocated. Every attempt past `validated` has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub attempt_id: AttemptId,
    pub customer_id: Option<CustomerId>,
    pub profile_url: String,
    pub target_audience: TargetAudience,
    pub current_step: PipelineStep,
    pub payment_status: PaymentState,
    pub scrape_status: ScrapeState,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn new(
        attempt_id: AttemptId,
        customer_id: Option<CustomerId>,
        profile_url: String,
        target_audience: TargetAudience,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id,
            customer_id,
            profile_url,
            target_audience,
            current_step: PipelineStep::Intake,
            payment_status: PaymentState::Pending,
            scrape_status: ScrapeState::Pending,
            progress_percent: PipelineStep::Intake.progress_target().unwrap_or(0),
            error_message: None,
            created_at,
            completed_at: None,
        }
    }
}

/// Raw scraped data for an attempt. Written once on terminal scrape success,
/// immutable thereafter. Field names follow the provider payload keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub first_name: String,
    pub last_name: String,
    pub headline: Option<String>,
    pub about: Option<String>,
    pub location: Option<String>,
    pub experience: Vec<serde_json::Value>,
    pub education: Vec<serde_json::Value>,
    pub skills: Vec<serde_json::Value>,
    pub certifications: Vec<serde_json::Value>,
    pub connections_count: u32,
    pub followers_count: u32,
    pub has_photo: bool,
    pub has_cover: bool,
    pub is_verified: bool,
    pub is_premium: bool,
    pub raw: serde_json::Value,
}

impl ProfileSnapshot {
    /// Build a snapshot from the first item of a completed scrape payload.
    /// Returns `None` when the payload carries no profile at all.
    pub fn from_payload(payload: serde_json::Value) -> Option<Self> {
        let item = match &payload {
            serde_json::Value::Array(items) => items.first()?.clone(),
            serde_json::Value::Object(_) => payload.clone(),
            _ => return None,
        };

        let str_field = |key: &str| {
            item.get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        };
        let list_field = |key: &str| {
            item.get(key)
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default()
        };
        let count_field = |key: &str| {
            item.get(key)
                .and_then(|v| v.as_u64())
                .unwrap_or(0)
                .min(u32::MAX as u64) as u32
        };

        let first_name = str_field("firstName")?;

        // The provider has shipped both key spellings for work history.
        let mut experience = list_field("experience");
        if experience.is_empty() {
            experience = list_field("positions");
        }

        Some(Self {
            first_name,
            last_name: str_field("lastName").unwrap_or_default(),
            headline: str_field("headline"),
            about: str_field("about"),
            location: str_field("geoLocationName"),
            experience,
            education: list_field("education"),
            skills: list_field("skills"),
            certifications: list_field("certifications"),
            connections_count: count_field("connectionsCount"),
            followers_count: count_field("followersCount"),
            has_photo: str_field("pictureUrl").is_some(),
            has_cover: str_field("coverImageUrl").is_some(),
            is_verified: item.get("isVerified").and_then(|v| v.as_bool()).unwrap_or(false),
            is_premium: item.get("isPremium").and_then(|v| v.as_bool()).unwrap_or(false),
            raw: item,
        })
    }

    pub fn full_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }
}

/// Payment gateway confirmation for an attempt, written by the webhook
/// collaborator and read by the runner to unblock the payment gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub attempt_id: AttemptId,
    pub provider_ref: String,
    pub amount: Option<f64>,
    pub status: PaymentState,
    pub received_at: DateTime<Utc>,
}
