//! Integration specifications for the profile analysis pipeline.
//!
//! Scenarios exercise the public runner facade end to end: intake through
//! scoring against stub providers, returning-user dedup, payment-gate
//! behavior, and attempt comparison, without reaching into private modules.

mod common {
    use async_trait::async_trait;
    use linkmetric::config::PipelineSettings;
    use linkmetric::pipeline::{
        IntakeRequest, JobHandle, JobPoll, PipelineRunner, ProfileSnapshot, ProviderError,
        ScrapeProvider, TargetAudience,
    };
    use linkmetric::scoring::{
        Appraisal, CapabilityError, ScoringCapability, Section, SectionAppraisal,
    };
    use linkmetric::store::{ActivityLog, CustomerIdAllocator, MemorySequence, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    pub(super) fn intake(url: &str, email: &str) -> IntakeRequest {
        IntakeRequest {
            profile_url: url.to_string(),
            email: email.to_string(),
            phone: Some("+15155550123".to_string()),
            target_audience: TargetAudience::Recruiters,
        }
    }

    pub(super) fn scrape_payload() -> serde_json::Value {
        json!([{
            "firstName": "Alex",
            "lastName": "Rivera",
            "headline": "Data Platform Lead",
            "about": "Fifteen years building pipelines that other teams rely on every day.",
            "experience": [{"title": "Lead"}, {"title": "Senior Engineer"}],
            "education": [{"school": "ISU"}],
            "skills": [{"name": "Rust"}],
            "certifications": [],
            "connectionsCount": 640,
            "followersCount": 900,
            "pictureUrl": "https://cdn.example/alex.jpg",
            "isVerified": false,
            "isPremium": false
        }])
    }

    /// Succeeds on the first status poll with a fixed payload.
    pub(super) struct StubScrapeProvider {
        payload: serde_json::Value,
    }

    impl StubScrapeProvider {
        pub(super) fn new() -> Self {
            Self {
                payload: scrape_payload(),
            }
        }
    }

    #[async_trait]
    impl ScrapeProvider for StubScrapeProvider {
        async fn submit(&self, profile_url: &str) -> Result<JobHandle, ProviderError> {
            Ok(JobHandle(format!("job::{profile_url}")))
        }

        async fn status(&self, _job: &JobHandle) -> Result<JobPoll, ProviderError> {
            Ok(JobPoll::Succeeded(self.payload.clone()))
        }
    }

    /// Always reports the job as failed.
    pub(super) struct FailingScrapeProvider;

    #[async_trait]
    impl ScrapeProvider for FailingScrapeProvider {
        async fn submit(&self, profile_url: &str) -> Result<JobHandle, ProviderError> {
            Ok(JobHandle(format!("job::{profile_url}")))
        }

        async fn status(&self, _job: &JobHandle) -> Result<JobPoll, ProviderError> {
            Ok(JobPoll::Failed("profile is private".to_string()))
        }
    }

    /// Returns a uniform appraisal, optionally omitting one section to
    /// exercise the incomplete-response path.
    pub(super) struct StubScorer {
        pub(super) uniform_score: u8,
        pub(super) drop_section: Option<Section>,
    }

    impl StubScorer {
        pub(super) fn scoring(uniform_score: u8) -> Self {
            Self {
                uniform_score,
                drop_section: None,
            }
        }
    }

    #[async_trait]
    impl ScoringCapability for StubScorer {
        async fn appraise(
            &self,
            snapshot: &ProfileSnapshot,
            _audience: TargetAudience,
        ) -> Result<Appraisal, CapabilityError> {
            let sections = Section::ordered()
                .into_iter()
                .filter(|section| Some(*section) != self.drop_section)
                .map(|section| SectionAppraisal {
                    section,
                    score: self.uniform_score,
                    analysis: format!("{} looks fine", section.label()),
                    ai_rewrite: None,
                    tags: Vec::new(),
                })
                .collect();

            Ok(Appraisal {
                sections,
                executive_summary: format!("{} has a workable profile.", snapshot.full_name()),
            })
        }
    }

    pub(super) fn fast_settings() -> PipelineSettings {
        PipelineSettings {
            payment_wait: Duration::from_millis(100),
            poll_base_interval: Duration::from_millis(2),
            poll_max_interval: Duration::from_millis(8),
            poll_max_windows: 5,
            ..PipelineSettings::default()
        }
    }

    pub(super) fn runner_with(
        scraper: Arc<dyn ScrapeProvider>,
        scorer: Arc<dyn ScoringCapability>,
    ) -> PipelineRunner {
        PipelineRunner::new(
            Arc::new(MemoryStore::new()),
            scraper,
            scorer,
            CustomerIdAllocator::new(Arc::new(MemorySequence::new())),
            ActivityLog::new(),
            &fast_settings(),
        )
    }

    pub(super) fn happy_runner() -> PipelineRunner {
        runner_with(
            Arc::new(StubScrapeProvider::new()),
            Arc::new(StubScorer::scoring(7)),
        )
    }
}

use chrono::Utc;
use common::{happy_runner, intake, runner_with, FailingScrapeProvider, StubScorer};
use linkmetric::pipeline::{
    AttemptId, PaymentConfirmation, PaymentState, PipelineError, PipelineRunner, PipelineStep,
    ScrapeState,
};
use linkmetric::scoring::{compare, Section};
use linkmetric::store::{AnalysisStore, LogStatus};
use std::sync::Arc;

fn confirm_payment(runner: &PipelineRunner, attempt_id: AttemptId) {
    let applied = runner
        .store()
        .apply_payment(PaymentConfirmation {
            attempt_id,
            provider_ref: format!("evt-{attempt_id}"),
            amount: Some(49.0),
            status: PaymentState::Succeeded,
            received_at: Utc::now(),
        })
        .expect("confirmation applies");
    assert!(applied);
}

async fn run_to_completion(runner: &PipelineRunner, url: &str, email: &str) -> AttemptId {
    let receipt = runner.start(intake(url, email)).expect("intake accepted");
    confirm_payment(runner, receipt.attempt_id);
    runner
        .run(receipt.attempt_id)
        .await
        .expect("pipeline completes");
    receipt.attempt_id
}

#[tokio::test]
async fn happy_path_reaches_complete_with_a_full_report() {
    let runner = happy_runner();
    let receipt = runner
        .start(intake("https://www.linkedin.com/in/alex-rivera", "alex@example.com"))
        .expect("intake accepted");
    assert!(!receipt.is_returning_user);
    assert_eq!(receipt.customer_id.as_str(), "LM-00001");

    confirm_payment(&runner, receipt.attempt_id);
    runner
        .run(receipt.attempt_id)
        .await
        .expect("pipeline completes");

    let attempt = runner
        .store()
        .attempt(&receipt.attempt_id)
        .expect("store readable")
        .expect("attempt exists");
    assert_eq!(attempt.current_step, PipelineStep::Complete);
    assert_eq!(attempt.progress_percent, 100);
    assert_eq!(attempt.payment_status, PaymentState::Succeeded);
    assert_eq!(attempt.scrape_status, ScrapeState::Completed);
    assert!(attempt.completed_at.is_some());

    let snapshot = runner
        .store()
        .snapshot(&receipt.attempt_id)
        .expect("store readable")
        .expect("snapshot persisted");
    assert_eq!(snapshot.full_name(), "Alex Rivera");

    // Uniform 7s across every weight sum to 70.
    let record = runner
        .store()
        .score_record(&receipt.attempt_id)
        .expect("store readable")
        .expect("record persisted");
    assert_eq!(record.sections.len(), 12);
    assert_eq!(record.final_score, 70);
    assert_eq!(record.grade_label, "Good");
    assert_eq!(record.top_priorities.len(), 3);

    let trail = runner.activity_log().for_attempt(receipt.attempt_id);
    assert!(trail.len() >= 9);
    assert!(trail.iter().all(|entry| entry.status != LogStatus::Error));
}

#[tokio::test]
async fn persisted_report_reads_back_exactly_as_written() {
    let runner = happy_runner();
    let attempt_id =
        run_to_completion(&runner, "https://linkedin.com/in/jordan-kim", "jk@example.com").await;

    let first_read = runner
        .store()
        .score_record(&attempt_id)
        .expect("store readable")
        .expect("record persisted");
    let second_read = runner
        .store()
        .score_record(&attempt_id)
        .expect("store readable")
        .expect("record persisted");
    assert_eq!(first_read, second_read);

    // Write-once: a second record for the same attempt is refused.
    let overwrite = runner.store().put_score_record(first_read);
    assert!(overwrite.is_err());
}

#[test]
fn concurrent_intakes_for_distinct_profiles_get_distinct_customers() {
    let runner = happy_runner();

    let handles: Vec<_> = (0..8)
        .map(|thread| {
            let runner = runner.clone();
            std::thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        runner
                            .start(intake(
                                &format!("https://linkedin.com/in/person-{thread}-{i}"),
                                &format!("person{thread}x{i}@example.com"),
                            ))
                            .expect("intake accepted")
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let receipts: Vec<_> = handles
        .into_iter()
        .flat_map(|handle| handle.join().expect("thread completes"))
        .collect();

    let mut attempt_ids: Vec<_> = receipts.iter().map(|r| r.attempt_id).collect();
    attempt_ids.sort_by_key(|id| id.to_string());
    attempt_ids.dedup();
    assert_eq!(attempt_ids.len(), 200);

    let mut customer_ids: Vec<_> = receipts.iter().map(|r| r.customer_id.clone()).collect();
    customer_ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    customer_ids.dedup();
    assert_eq!(customer_ids.len(), 200);
}

#[test]
fn concurrent_intakes_for_the_same_profile_share_one_customer() {
    let runner = happy_runner();
    let url = "https://linkedin.com/in/shared-profile";

    let handles: Vec<_> = (0..8)
        .map(|thread| {
            let runner = runner.clone();
            let url = url.to_string();
            std::thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        runner
                            .start(intake(&url, &format!("alias{thread}x{i}@example.com")))
                            .expect("intake accepted")
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let receipts: Vec<_> = handles
        .into_iter()
        .flat_map(|handle| handle.join().expect("thread completes"))
        .collect();

    let mut customer_ids: Vec<_> = receipts.iter().map(|r| r.customer_id.clone()).collect();
    customer_ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    customer_ids.dedup();
    assert_eq!(customer_ids.len(), 1);

    let customer = runner
        .store()
        .customer(&customer_ids[0])
        .expect("store readable")
        .expect("customer exists");
    assert_eq!(customer.total_attempts, 200);
}

#[tokio::test]
async fn returning_user_keeps_their_customer_id_across_runs() {
    let runner = happy_runner();
    let url = "https://www.linkedin.com/in/alex-rivera";

    let first = run_to_completion(&runner, url, "alex@example.com").await;

    // Same profile submitted under a different email.
    let receipt = runner
        .start(intake(url, "alex.work@example.com"))
        .expect("intake accepted");
    assert!(receipt.is_returning_user);

    confirm_payment(&runner, receipt.attempt_id);
    runner.run(receipt.attempt_id).await.expect("second run completes");

    let first_attempt = runner
        .store()
        .attempt(&first)
        .expect("store readable")
        .expect("attempt exists");
    assert_eq!(first_attempt.customer_id.as_ref(), Some(&receipt.customer_id));

    let history = runner
        .store()
        .attempts_for_customer(&receipt.customer_id)
        .expect("store readable");
    assert_eq!(history.len(), 2);
    // Most recent first.
    assert_eq!(history[0].attempt_id, receipt.attempt_id);
    assert_eq!(history[1].attempt_id, first);
}

#[test]
fn rejected_intakes_are_persisted_in_a_terminal_step() {
    let runner = happy_runner();

    let err = runner
        .start(intake("https://linkedin.com/company/acme", "hr@example.com"))
        .expect_err("company pages are refused");
    let PipelineError::Rejected { attempt_id, .. } = err else {
        panic!("expected a rejection, got {err}");
    };
    let attempt = runner
        .store()
        .attempt(&attempt_id)
        .expect("store readable")
        .expect("rejection on record");
    assert_eq!(attempt.current_step, PipelineStep::NotFound);
    assert!(attempt.customer_id.is_none());
    assert!(attempt.error_message.is_some());
    assert!(attempt.completed_at.is_some());

    let err = runner
        .start(intake("ftp://not-a-profile", "hr@example.com"))
        .expect_err("scheme is refused");
    let PipelineError::Rejected { attempt_id, .. } = err else {
        panic!("expected a rejection, got {err}");
    };
    let attempt = runner
        .store()
        .attempt(&attempt_id)
        .expect("store readable")
        .expect("rejection on record");
    assert_eq!(attempt.current_step, PipelineStep::InvalidUrl);

    // Rejections never allocate a customer id.
    let receipt = runner
        .start(intake("https://linkedin.com/in/first-valid", "fv@example.com"))
        .expect("intake accepted");
    assert_eq!(receipt.customer_id.as_str(), "LM-00001");
}

#[tokio::test]
async fn duplicate_payment_confirmations_do_not_disturb_the_attempt() {
    let runner = happy_runner();
    let receipt = runner
        .start(intake("https://linkedin.com/in/sam-oduya", "sam@example.com"))
        .expect("intake accepted");

    confirm_payment(&runner, receipt.attempt_id);
    runner.run(receipt.attempt_id).await.expect("pipeline completes");

    // Gateway redelivery after completion: acknowledged, nothing reapplied.
    let reapplied = runner
        .store()
        .apply_payment(PaymentConfirmation {
            attempt_id: receipt.attempt_id,
            provider_ref: format!("evt-{}", receipt.attempt_id),
            amount: Some(49.0),
            status: PaymentState::Succeeded,
            received_at: Utc::now(),
        })
        .expect("redelivery accepted");
    assert!(!reapplied);

    let attempt = runner
        .store()
        .attempt(&receipt.attempt_id)
        .expect("store readable")
        .expect("attempt exists");
    assert_eq!(attempt.current_step, PipelineStep::Complete);
    assert_eq!(attempt.payment_status, PaymentState::Succeeded);
}

#[tokio::test]
async fn missing_payment_confirmation_fails_the_attempt_after_the_wait() {
    let runner = happy_runner();
    let receipt = runner
        .start(intake("https://linkedin.com/in/no-payment", "np@example.com"))
        .expect("intake accepted");

    let err = runner
        .run(receipt.attempt_id)
        .await
        .expect_err("gate expires");
    assert!(matches!(err, PipelineError::Payment(_)));

    let attempt = runner
        .store()
        .attempt(&receipt.attempt_id)
        .expect("store readable")
        .expect("attempt exists");
    assert_eq!(attempt.current_step, PipelineStep::Failed);
    assert!(attempt.error_message.is_some());
}

#[tokio::test]
async fn scrape_failure_lands_the_attempt_in_failed() {
    let runner = runner_with(
        Arc::new(FailingScrapeProvider),
        Arc::new(StubScorer::scoring(7)),
    );
    let receipt = runner
        .start(intake("https://linkedin.com/in/private-profile", "pp@example.com"))
        .expect("intake accepted");
    confirm_payment(&runner, receipt.attempt_id);

    let err = runner
        .run(receipt.attempt_id)
        .await
        .expect_err("scrape fails");
    assert!(matches!(err, PipelineError::ScrapeFailed(_)));

    let attempt = runner
        .store()
        .attempt(&receipt.attempt_id)
        .expect("store readable")
        .expect("attempt exists");
    assert_eq!(attempt.current_step, PipelineStep::Failed);
    assert_eq!(attempt.scrape_status, ScrapeState::Failed);
}

#[tokio::test]
async fn incomplete_scoring_response_fails_the_attempt_without_a_record() {
    let runner = runner_with(
        Arc::new(common::StubScrapeProvider::new()),
        Arc::new(StubScorer {
            uniform_score: 7,
            drop_section: Some(Section::Premium),
        }),
    );
    let receipt = runner
        .start(intake("https://linkedin.com/in/eleven-sections", "es@example.com"))
        .expect("intake accepted");
    confirm_payment(&runner, receipt.attempt_id);

    let err = runner
        .run(receipt.attempt_id)
        .await
        .expect_err("partial scoring rejected");
    assert!(matches!(err, PipelineError::ScoringIncomplete(_)));

    let attempt = runner
        .store()
        .attempt(&receipt.attempt_id)
        .expect("store readable")
        .expect("attempt exists");
    assert_eq!(attempt.current_step, PipelineStep::Failed);

    // A guessed or partial report must never be persisted.
    let record = runner
        .store()
        .score_record(&receipt.attempt_id)
        .expect("store readable");
    assert!(record.is_none());
}

#[tokio::test]
async fn comparison_is_antisymmetric_between_two_runs() {
    let store = Arc::new(linkmetric::store::MemoryStore::new());
    let url = "https://linkedin.com/in/alex-rivera";

    let first_runner = PipelineRunner::new(
        store.clone(),
        Arc::new(common::StubScrapeProvider::new()),
        Arc::new(StubScorer::scoring(5)),
        linkmetric::store::CustomerIdAllocator::new(Arc::new(
            linkmetric::store::MemorySequence::new(),
        )),
        linkmetric::store::ActivityLog::new(),
        &common::fast_settings(),
    );
    let first = run_to_completion(&first_runner, url, "alex@example.com").await;

    // Second run scores higher across the board.
    let second_runner = PipelineRunner::new(
        store.clone(),
        Arc::new(common::StubScrapeProvider::new()),
        Arc::new(StubScorer::scoring(8)),
        linkmetric::store::CustomerIdAllocator::new(Arc::new(
            linkmetric::store::MemorySequence::new(),
        )),
        linkmetric::store::ActivityLog::new(),
        &common::fast_settings(),
    );
    let second = run_to_completion(&second_runner, url, "alex@example.com").await;

    let forward = compare::compare(store.as_ref(), second, first).expect("comparison builds");
    let backward = compare::compare(store.as_ref(), first, second).expect("comparison builds");

    assert_eq!(forward.overall_delta, 30);
    assert_eq!(backward.overall_delta, -forward.overall_delta);
    for (f, b) in forward.sections.iter().zip(backward.sections.iter()) {
        assert_eq!(f.section, b.section);
        assert_eq!(f.delta, -b.delta);
    }

    let self_compare = compare::compare(store.as_ref(), first, first);
    assert!(self_compare.is_err());
}
