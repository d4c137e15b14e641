//! Service wiring: shared state for the HTTP layer and simulated provider
//! implementations used by the demo command, the test suite, and local
//! development. Production deployments swap the simulated seams for real
//! provider clients.

use async_trait::async_trait;
use chrono::Utc;
use linkmetric::pipeline::{
    AttemptId, JobHandle, JobPoll, PaymentConfirmation, PaymentState, PipelineRunner,
    ProfileSnapshot, ProviderError, ScrapeProvider, TargetAudience,
};
use linkmetric::scoring::{
    Appraisal, CapabilityError, ScoringCapability, Section, SectionAppraisal,
};
use linkmetric::store::AnalysisStore;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Everything the route handlers need.
pub(crate) struct ApiContext {
    pub(crate) runner: PipelineRunner,
    pub(crate) auto_confirm_payments: bool,
}

impl ApiContext {
    /// Post a succeeded confirmation for an attempt, as the development
    /// stand-in for the payment gateway webhook.
    pub(crate) fn confirm_payment(&self, attempt_id: AttemptId) {
        let confirmation = PaymentConfirmation {
            attempt_id,
            provider_ref: format!("sim-{attempt_id}"),
            amount: Some(49.0),
            status: PaymentState::Succeeded,
            received_at: Utc::now(),
        };
        // Idempotent; a duplicate confirmation is a no-op.
        let _ = self.runner.store().apply_payment(confirmation);
    }

    pub(crate) fn store(&self) -> &Arc<dyn AnalysisStore> {
        self.runner.store()
    }
}

/// Scrape provider that reports `running` for a fixed number of polls and
/// then succeeds with a payload derived from the profile URL slug.
pub(crate) struct SimulatedScrapeProvider {
    polls_until_done: u32,
    poll_counts: Mutex<HashMap<String, u32>>,
}

impl SimulatedScrapeProvider {
    pub(crate) fn new(polls_until_done: u32) -> Self {
        Self {
            polls_until_done,
            poll_counts: Mutex::new(HashMap::new()),
        }
    }

    fn payload_for(profile_url: &str) -> serde_json::Value {
        let slug = profile_url.rsplit('/').next().unwrap_or("member");
        let first_name = slug
            .split('-')
            .next()
            .map(capitalize)
            .unwrap_or_else(|| "Member".to_string());
        let last_name = slug.split('-').nth(1).map(capitalize).unwrap_or_default();

        json!([{
            "firstName": first_name,
            "lastName": last_name,
            "headline": "Engineering leader building data products",
            "about": "Two decades of shipping software, from startups to scale-ups.",
            "geoLocationName": "Des Moines, Iowa",
            "experience": [
                {"title": "VP Engineering", "company": "Acme Analytics"},
                {"title": "Staff Engineer", "company": "Widget Co"}
            ],
            "education": [{"school": "State University", "degree": "BSc"}],
            "skills": [{"name": "Rust"}, {"name": "Distributed Systems"}, {"name": "Leadership"}],
            "certifications": [{"name": "Cloud Architect"}],
            "connectionsCount": 870,
            "followersCount": 1530,
            "pictureUrl": "https://cdn.example/profile.jpg",
            "isVerified": false,
            "isPremium": false
        }])
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[async_trait]
impl ScrapeProvider for SimulatedScrapeProvider {
    async fn submit(&self, profile_url: &str) -> Result<JobHandle, ProviderError> {
        Ok(JobHandle(format!("sim-job::{profile_url}")))
    }

    async fn status(&self, job: &JobHandle) -> Result<JobPoll, ProviderError> {
        let polls = {
            let mut counts = self.poll_counts.lock().expect("poll count mutex poisoned");
            let entry = counts.entry(job.0.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        if polls < self.polls_until_done {
            return Ok(JobPoll::Running);
        }

        let profile_url = job.0.strip_prefix("sim-job::").unwrap_or(&job.0);
        Ok(JobPoll::Succeeded(Self::payload_for(profile_url)))
    }
}

/// Deterministic scoring capability: scores each section from what the
/// snapshot actually contains, so demo reports and tests are reproducible.
#[derive(Default)]
pub(crate) struct SimulatedScoringCapability;

impl SimulatedScoringCapability {
    fn section_score(snapshot: &ProfileSnapshot, section: Section) -> u8 {
        let presence = |present: bool, high: u8, low: u8| if present { high } else { low };
        match section {
            Section::Experience => (4 + 2 * snapshot.experience.len() as u8).min(10),
            Section::About => match &snapshot.about {
                Some(text) if text.len() >= 60 => 8,
                Some(_) => 5,
                None => 1,
            },
            Section::Headline => presence(snapshot.headline.is_some(), 8, 1),
            Section::ProfilePhoto => presence(snapshot.has_photo, 9, 0),
            Section::Education => presence(!snapshot.education.is_empty(), 8, 2),
            Section::Skills => (3 + 2 * snapshot.skills.len() as u8).min(10),
            Section::Connections => match snapshot.connections_count {
                n if n >= 500 => 9,
                n if n >= 100 => 6,
                _ => 2,
            },
            Section::Followers => match snapshot.followers_count {
                n if n >= 1000 => 9,
                n if n >= 200 => 6,
                _ => 2,
            },
            Section::CoverPhoto => presence(snapshot.has_cover, 8, 2),
            Section::Certifications => presence(!snapshot.certifications.is_empty(), 8, 2),
            Section::Verified => presence(snapshot.is_verified, 10, 3),
            Section::Premium => presence(snapshot.is_premium, 10, 5),
        }
    }
}

#[async_trait]
impl ScoringCapability for SimulatedScoringCapability {
    async fn appraise(
        &self,
        snapshot: &ProfileSnapshot,
        audience: TargetAudience,
    ) -> Result<Appraisal, CapabilityError> {
        let sections = Section::ordered()
            .into_iter()
            .map(|section| {
                let score = Self::section_score(snapshot, section);
                SectionAppraisal {
                    section,
                    score,
                    analysis: format!(
                        "{} scored {score}/10 for the audience: {}",
                        section.label(),
                        audience.describe()
                    ),
                    ai_rewrite: match section {
                        Section::Headline => Some(format!(
                            "{} | Turning engineering depth into business outcomes",
                            snapshot.headline.clone().unwrap_or_default()
                        )),
                        _ => None,
                    },
                    tags: match section {
                        Section::Headline => {
                            vec!["Keywords".to_string(), "Value Proposition".to_string()]
                        }
                        Section::About => {
                            vec!["Storytelling".to_string(), "Call to Action".to_string()]
                        }
                        _ => Vec::new(),
                    },
                }
            })
            .collect();

        Ok(Appraisal {
            sections,
            executive_summary: format!(
                "{} presents a credible profile; the biggest wins are in the lowest-scoring sections.",
                snapshot.full_name()
            ),
        })
    }
}
