//! Drives one attempt through the fixed pipeline.
//!
//! `start` does the synchronous half: validation, customer dedup, id
//! allocation, and attempt creation through `payment_pending`. The host then
//! schedules `run` (typically `tokio::spawn`) to drive the asynchronous half:
//! payment gate, scrape, scoring, persistence. Exactly one runner execution
//! owns a given attempt at a time; nothing else mutates attempt fields.

use super::domain::{
    Attempt, AttemptId, Customer, CustomerId, PaymentState, ProfileSnapshot, ScrapeState,
    TargetAudience,
};
use super::intake::{IntakeError, IntakeRequest, ValidatedIntake};
use super::poller::{PollError, PollPolicy, ProviderError, ScrapeJobPoller, ScrapeProvider};
use super::step::PipelineStep;
use crate::config::PipelineSettings;
use crate::scoring::invoker::{ScoringCapability, ScoringError, ScoringInvoker};
use crate::store::activity::{ActivityLog, LogStatus};
use crate::store::allocator::{CustomerIdAllocator, SequenceError};
use crate::store::{AnalysisStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] IntakeError),
    /// Validation rejected the intake. The submission is still on record:
    /// `attempt_id` names a persisted attempt frozen in its immediate-failure
    /// terminal step.
    #[error("intake rejected: {source}")]
    Rejected {
        attempt_id: AttemptId,
        #[source]
        source: IntakeError,
    },
    #[error("payment gate: {0}")]
    Payment(String),
    #[error("scrape failed: {0}")]
    ScrapeFailed(String),
    #[error("scrape timed out after {windows} polling windows")]
    ScrapeTimeout { windows: u32 },
    #[error("scoring incomplete: {0}")]
    ScoringIncomplete(#[from] ScoringError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

impl From<PollError> for PipelineError {
    fn from(value: PollError) -> Self {
        match value {
            PollError::Failed(message) => PipelineError::ScrapeFailed(message),
            PollError::TimedOut { windows } => PipelineError::ScrapeTimeout { windows },
            PollError::Provider(ProviderError(message)) => PipelineError::ScrapeFailed(message),
        }
    }
}

/// Outcome of a successful `start` call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StartReceipt {
    pub attempt_id: AttemptId,
    pub customer_id: CustomerId,
    pub is_returning_user: bool,
}

#[derive(Clone)]
pub struct PipelineRunner {
    store: Arc<dyn AnalysisStore>,
    scraper: Arc<dyn ScrapeProvider>,
    scorer: Arc<dyn ScoringCapability>,
    allocator: CustomerIdAllocator,
    log: ActivityLog,
    payment_wait: Duration,
    poller: ScrapeJobPoller,
    invoker: ScoringInvoker,
}

impl PipelineRunner {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        scraper: Arc<dyn ScrapeProvider>,
        scorer: Arc<dyn ScoringCapability>,
        allocator: CustomerIdAllocator,
        log: ActivityLog,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            store,
            scraper,
            scorer,
            allocator,
            log,
            payment_wait: settings.payment_wait,
            poller: ScrapeJobPoller::new(PollPolicy {
                base_interval: settings.poll_base_interval,
                max_interval: settings.poll_max_interval,
                max_windows: settings.poll_max_windows,
            }),
            invoker: ScoringInvoker::new(settings.grade),
        }
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        &self.store
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    /// Validate the intake, dedup or create the customer, and create the
    /// attempt through `payment_pending`. Rejected input is persisted too,
    /// frozen in `invalid_url` or `not_found`, so the submission stays
    /// visible to status polling; no customer is allocated for it.
    pub fn start(&self, request: IntakeRequest) -> Result<StartReceipt, PipelineError> {
        let raw_url = request.profile_url.clone();
        let audience = request.target_audience;
        let intake = match request.validated() {
            Ok(intake) => intake,
            Err(err) => return Err(self.record_rejection(raw_url, audience, err)),
        };

        let (customer, is_returning_user) = self.find_or_create_customer(&intake)?;
        let customer_id = customer.customer_id.clone();

        let attempt = Attempt::new(
            AttemptId::generate(),
            Some(customer_id.clone()),
            intake.profile_url.clone(),
            intake.target_audience,
            Utc::now(),
        );
        let attempt_id = attempt.attempt_id;
        self.store.record_new_attempt(attempt)?;
        self.log_step(attempt_id, &customer_id, "intake", "attempt created");

        self.advance(attempt_id, &customer_id, PipelineStep::Validated)?;
        self.advance(attempt_id, &customer_id, PipelineStep::Allocated)?;
        self.advance(attempt_id, &customer_id, PipelineStep::PaymentPending)?;

        info!(%attempt_id, %customer_id, is_returning_user, "analysis attempt accepted");

        Ok(StartReceipt {
            attempt_id,
            customer_id,
            is_returning_user,
        })
    }

    /// Drive an accepted attempt to a terminal step. Any pipeline error lands
    /// the attempt in `failed` with its message captured; the error is also
    /// returned so the host can observe it.
    pub async fn run(&self, attempt_id: AttemptId) -> Result<(), PipelineError> {
        match self.drive(attempt_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.fail_attempt(attempt_id, &err);
                Err(err)
            }
        }
    }

    async fn drive(&self, attempt_id: AttemptId) -> Result<(), PipelineError> {
        let attempt = self
            .store
            .attempt(&attempt_id)?
            .ok_or(StoreError::NotFound)?;
        // Only `start` schedules a run, so the customer is always assigned.
        let customer_id = attempt.customer_id.clone().ok_or(StoreError::NotFound)?;

        self.wait_for_payment(attempt_id).await?;
        self.advance(attempt_id, &customer_id, PipelineStep::PaymentConfirmed)?;

        let job = self.scraper.submit(&attempt.profile_url).await.map_err(
            |ProviderError(message)| PipelineError::ScrapeFailed(message),
        )?;
        self.store
            .update_scrape_state(&attempt_id, ScrapeState::Scraping)?;
        self.advance(attempt_id, &customer_id, PipelineStep::Scraping)?;
        self.log_step(
            attempt_id,
            &customer_id,
            "scrape_start",
            &format!("scrape job {} submitted", job.0),
        );

        let payload = self
            .poller
            .poll_to_completion(self.scraper.as_ref(), &job, &self.log, attempt_id)
            .await
            .map_err(|err| {
                let _ = self
                    .store
                    .update_scrape_state(&attempt_id, ScrapeState::Failed);
                PipelineError::from(err)
            })?;

        let snapshot = ProfileSnapshot::from_payload(payload).ok_or_else(|| {
            PipelineError::ScrapeFailed("completed scrape carried no profile data".to_string())
        })?;
        self.store.put_snapshot(&attempt_id, snapshot.clone())?;
        self.store
            .update_scrape_state(&attempt_id, ScrapeState::Completed)?;
        self.advance(attempt_id, &customer_id, PipelineStep::ScrapingComplete)?;

        self.advance(attempt_id, &customer_id, PipelineStep::Scoring)?;
        let record = self
            .invoker
            .invoke(
                self.scorer.as_ref(),
                &snapshot,
                attempt.target_audience,
                attempt_id,
                customer_id.clone(),
            )
            .await?;
        let final_score = record.final_score;
        self.store.put_score_record(record)?;
        self.advance(attempt_id, &customer_id, PipelineStep::Complete)?;
        self.log_step(
            attempt_id,
            &customer_id,
            "scoring",
            &format!("final score {final_score}"),
        );

        Ok(())
    }

    /// Block until a payment confirmation for this attempt is observed, or
    /// the bounded wait expires. Waits on the store's payment notifier rather
    /// than polling.
    async fn wait_for_payment(&self, attempt_id: AttemptId) -> Result<(), PipelineError> {
        let notifier = self.store.payment_notifier();
        let deadline = tokio::time::Instant::now() + self.payment_wait;

        loop {
            // Register interest before checking, so a confirmation landing
            // between check and wait still wakes us.
            let notified = notifier.notified();

            if let Some(confirmation) = self.store.payment(&attempt_id)? {
                self.store
                    .update_payment_state(&attempt_id, confirmation.status)?;
                match confirmation.status {
                    PaymentState::Succeeded => return Ok(()),
                    PaymentState::Failed => {
                        return Err(PipelineError::Payment(format!(
                            "gateway reported failure for {}",
                            confirmation.provider_ref
                        )));
                    }
                    PaymentState::Pending => {}
                }
            }

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(PipelineError::Payment(format!(
                        "no confirmation within {}s",
                        self.payment_wait.as_secs()
                    )));
                }
            }
        }
    }

    fn find_or_create_customer(
        &self,
        intake: &ValidatedIntake,
    ) -> Result<(Customer, bool), PipelineError> {
        if let Some(existing) = self.store.customer_by_profile_url(&intake.profile_url)? {
            return Ok((existing, true));
        }
        if let Some(existing) = self.store.customer_by_email(&intake.email)? {
            return Ok((existing, true));
        }

        let customer = Customer {
            customer_id: self.allocator.next_id()?,
            profile_url: intake.profile_url.clone(),
            email: intake.email.clone(),
            phone: intake.phone.clone(),
            created_at: Utc::now(),
            total_attempts: 0,
            last_attempt_at: None,
        };

        match self.store.create_customer(customer.clone()) {
            Ok(()) => {
                self.log.append(
                    None,
                    Some(customer.customer_id.clone()),
                    "allocate_id",
                    LogStatus::Success,
                    format!("customer {} allocated", customer.customer_id),
                );
                Ok((customer, false))
            }
            // A concurrent intake for the same profile won the race; use the
            // record it created. The allocated id is abandoned, not reused.
            Err(StoreError::Conflict) => {
                let existing = self
                    .store
                    .customer_by_profile_url(&intake.profile_url)?
                    .ok_or(StoreError::NotFound)?;
                Ok((existing, true))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Persist a rejected intake as an attempt frozen in its immediate-failure
    /// terminal step: `not_found` when the URL points at a non-personal page,
    /// `invalid_url` for every other validation failure.
    fn record_rejection(
        &self,
        raw_url: String,
        audience: TargetAudience,
        err: IntakeError,
    ) -> PipelineError {
        let attempt = Attempt::new(AttemptId::generate(), None, raw_url.clone(), audience, Utc::now());
        let attempt_id = attempt.attempt_id;
        let terminal = match &err {
            IntakeError::NotPersonalProfile(_) => PipelineStep::NotFound,
            _ => PipelineStep::InvalidUrl,
        };

        let stored = self.store.record_new_attempt(attempt).and_then(|()| {
            self.store
                .transition(&attempt_id, terminal, Some(err.to_string()))
                .map(|_| ())
        });
        if let Err(store_err) = stored {
            warn!(%attempt_id, error = %store_err, "unable to record rejected intake");
        }

        self.log.append(
            Some(attempt_id),
            None,
            "intake",
            LogStatus::Error,
            format!("rejected '{raw_url}': {err}"),
        );

        PipelineError::Rejected {
            attempt_id,
            source: err,
        }
    }

    /// One legal transition plus its single activity log entry.
    fn advance(
        &self,
        attempt_id: AttemptId,
        customer_id: &CustomerId,
        to: PipelineStep,
    ) -> Result<(), PipelineError> {
        let updated = self.store.transition(&attempt_id, to, None)?;
        self.log.append(
            Some(attempt_id),
            Some(customer_id.clone()),
            "step",
            LogStatus::Success,
            format!(
                "{} ({}%)",
                to.label(),
                updated.progress_percent
            ),
        );
        Ok(())
    }

    fn log_step(
        &self,
        attempt_id: AttemptId,
        customer_id: &CustomerId,
        event_type: &str,
        message: &str,
    ) {
        self.log.append(
            Some(attempt_id),
            Some(customer_id.clone()),
            event_type,
            LogStatus::Success,
            message.to_string(),
        );
    }

    fn fail_attempt(&self, attempt_id: AttemptId, err: &PipelineError) {
        warn!(%attempt_id, error = %err, "attempt failed");

        let customer_id = self
            .store
            .attempt(&attempt_id)
            .ok()
            .flatten()
            .and_then(|attempt| attempt.customer_id);

        if let Err(store_err) =
            self.store
                .transition(&attempt_id, PipelineStep::Failed, Some(err.to_string()))
        {
            warn!(%attempt_id, error = %store_err, "unable to record failure");
        }

        self.log.append(
            Some(attempt_id),
            customer_id,
            "failure",
            LogStatus::Error,
            err.to_string(),
        );
    }
}
