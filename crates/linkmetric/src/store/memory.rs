//! In-memory [`AnalysisStore`]. One mutex guards the whole table set so a
//! primary write and its derived indexes land together. State lives for the
//! life of the process; the demo command and the test suites use this
//! backing, the server uses [`FileStore`](super::FileStore).

use super::tables::Tables;
use super::{AnalysisStore, StoreError};
use crate::pipeline::domain::{
    Attempt, AttemptId, Customer, CustomerId, PaymentConfirmation, PaymentState, ProfileSnapshot,
    ScrapeState,
};
use crate::pipeline::step::PipelineStep;
use crate::scoring::invoker::ScoreRecord;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    payment_notify: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("store mutex poisoned")
    }
}

impl AnalysisStore for MemoryStore {
    fn create_customer(&self, customer: Customer) -> Result<(), StoreError> {
        self.lock().create_customer(customer)
    }

    fn customer(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.lock().customer(id))
    }

    fn customer_by_profile_url(&self, url: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self.lock().customer_by_profile_url(url))
    }

    fn customer_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self.lock().customer_by_email(email))
    }

    fn record_new_attempt(&self, attempt: Attempt) -> Result<(), StoreError> {
        self.lock().record_new_attempt(attempt)
    }

    fn attempt(&self, id: &AttemptId) -> Result<Option<Attempt>, StoreError> {
        Ok(self.lock().attempt(id))
    }

    fn attempts_for_customer(&self, id: &CustomerId) -> Result<Vec<Attempt>, StoreError> {
        Ok(self.lock().attempts_for_customer(id))
    }

    fn transition(
        &self,
        id: &AttemptId,
        to: PipelineStep,
        error_message: Option<String>,
    ) -> Result<Attempt, StoreError> {
        self.lock().transition(id, to, error_message)
    }

    fn update_payment_state(&self, id: &AttemptId, state: PaymentState) -> Result<(), StoreError> {
        self.lock().update_payment_state(id, state)
    }

    fn update_scrape_state(&self, id: &AttemptId, state: ScrapeState) -> Result<(), StoreError> {
        self.lock().update_scrape_state(id, state)
    }

    fn put_snapshot(&self, id: &AttemptId, snapshot: ProfileSnapshot) -> Result<(), StoreError> {
        self.lock().put_snapshot(id, snapshot)
    }

    fn snapshot(&self, id: &AttemptId) -> Result<Option<ProfileSnapshot>, StoreError> {
        Ok(self.lock().snapshot(id))
    }

    fn put_score_record(&self, record: ScoreRecord) -> Result<(), StoreError> {
        self.lock().put_score_record(record)
    }

    fn score_record(&self, id: &AttemptId) -> Result<Option<ScoreRecord>, StoreError> {
        Ok(self.lock().score_record(id))
    }

    fn apply_payment(&self, confirmation: PaymentConfirmation) -> Result<bool, StoreError> {
        let applied = self.lock().apply_payment(confirmation);
        if applied {
            self.payment_notify.notify_waiters();
        }
        Ok(applied)
    }

    fn payment(&self, id: &AttemptId) -> Result<Option<PaymentConfirmation>, StoreError> {
        Ok(self.lock().payment(id))
    }

    fn payment_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.payment_notify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::domain::TargetAudience;
    use chrono::{Duration, Utc};

    fn customer(id: &str, url: &str, email: &str) -> Customer {
        Customer {
            customer_id: CustomerId(id.to_string()),
            profile_url: url.to_string(),
            email: email.to_string(),
            phone: None,
            created_at: Utc::now(),
            total_attempts: 0,
            last_attempt_at: None,
        }
    }

    fn attempt(customer_id: &str) -> Attempt {
        Attempt::new(
            AttemptId::generate(),
            Some(CustomerId(customer_id.to_string())),
            "https://site.com/in/jane-doe".to_string(),
            TargetAudience::Recruiters,
            Utc::now(),
        )
    }

    #[test]
    fn url_and_email_indexes_resolve_to_the_customer() {
        let store = MemoryStore::new();
        store
            .create_customer(customer("LM-00001", "https://site.com/in/jane-doe", "jane@x.com"))
            .expect("creates");

        let by_url = store
            .customer_by_profile_url("https://site.com/in/jane-doe")
            .expect("lookup")
            .expect("found");
        assert_eq!(by_url.customer_id.as_str(), "LM-00001");

        let by_email = store
            .customer_by_email("jane@x.com")
            .expect("lookup")
            .expect("found");
        assert_eq!(by_email.customer_id, by_url.customer_id);

        assert!(store
            .customer_by_profile_url("https://site.com/in/someone-else")
            .expect("lookup")
            .is_none());
    }

    #[test]
    fn duplicate_profile_url_conflicts() {
        let store = MemoryStore::new();
        store
            .create_customer(customer("LM-00001", "https://site.com/in/jane-doe", "jane@x.com"))
            .expect("creates");
        let err = store
            .create_customer(customer("LM-00002", "https://site.com/in/jane-doe", "other@x.com"))
            .expect_err("same url conflicts");
        assert!(matches!(err, StoreError::Conflict));
    }

    #[test]
    fn new_attempt_bumps_customer_counters() {
        let store = MemoryStore::new();
        store
            .create_customer(customer("LM-00001", "https://site.com/in/jane-doe", "jane@x.com"))
            .expect("creates");
        store.record_new_attempt(attempt("LM-00001")).expect("records");
        store.record_new_attempt(attempt("LM-00001")).expect("records");

        let owner = store
            .customer(&CustomerId("LM-00001".to_string()))
            .expect("lookup")
            .expect("found");
        assert_eq!(owner.total_attempts, 2);
        assert!(owner.last_attempt_at.is_some());
    }

    #[test]
    fn attempts_without_a_customer_leave_customer_tables_alone() {
        let store = MemoryStore::new();
        store
            .create_customer(customer("LM-00001", "https://site.com/in/jane-doe", "jane@x.com"))
            .expect("creates");

        let orphan = Attempt::new(
            AttemptId::generate(),
            None,
            "not a profile url".to_string(),
            TargetAudience::Recruiters,
            Utc::now(),
        );
        let orphan_id = orphan.attempt_id;
        store.record_new_attempt(orphan).expect("records");

        let stored = store.attempt(&orphan_id).expect("lookup").expect("found");
        assert!(stored.customer_id.is_none());

        let owner = store
            .customer(&CustomerId("LM-00001".to_string()))
            .expect("lookup")
            .expect("found");
        assert_eq!(owner.total_attempts, 0);
    }

    #[test]
    fn history_is_most_recent_first() {
        let store = MemoryStore::new();
        store
            .create_customer(customer("LM-00001", "https://site.com/in/jane-doe", "jane@x.com"))
            .expect("creates");

        let mut older = attempt("LM-00001");
        older.created_at = Utc::now() - Duration::hours(2);
        let newer = attempt("LM-00001");
        let older_id = older.attempt_id;
        let newer_id = newer.attempt_id;
        store.record_new_attempt(older).expect("records");
        store.record_new_attempt(newer).expect("records");

        let history = store
            .attempts_for_customer(&CustomerId("LM-00001".to_string()))
            .expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].attempt_id, newer_id);
        assert_eq!(history[1].attempt_id, older_id);
    }

    #[test]
    fn transition_enforces_the_step_table_and_monotone_progress() {
        let store = MemoryStore::new();
        store
            .create_customer(customer("LM-00001", "https://site.com/in/jane-doe", "jane@x.com"))
            .expect("creates");
        let record = attempt("LM-00001");
        let id = record.attempt_id;
        store.record_new_attempt(record).expect("records");

        let err = store
            .transition(&id, PipelineStep::Scraping, None)
            .expect_err("skipping steps is illegal");
        assert!(matches!(
            err,
            StoreError::IllegalTransition {
                from: PipelineStep::Intake,
                to: PipelineStep::Scraping
            }
        ));

        let updated = store
            .transition(&id, PipelineStep::Validated, None)
            .expect("legal step");
        assert_eq!(updated.progress_percent, 10);

        let failed = store
            .transition(&id, PipelineStep::Failed, Some("boom".to_string()))
            .expect("failure is reachable");
        assert_eq!(failed.current_step, PipelineStep::Failed);
        assert_eq!(failed.progress_percent, 10, "progress freezes on failure");
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
        assert!(failed.completed_at.is_some());

        let err = store
            .transition(&id, PipelineStep::Allocated, None)
            .expect_err("terminal steps have no exits");
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[test]
    fn snapshot_is_write_once() {
        let store = MemoryStore::new();
        store
            .create_customer(customer("LM-00001", "https://site.com/in/jane-doe", "jane@x.com"))
            .expect("creates");
        let record = attempt("LM-00001");
        let id = record.attempt_id;
        store.record_new_attempt(record).expect("records");

        let snapshot = ProfileSnapshot::from_payload(serde_json::json!([
            {"firstName": "Jane", "lastName": "Doe"}
        ]))
        .expect("parses");
        store.put_snapshot(&id, snapshot.clone()).expect("first write");
        let err = store.put_snapshot(&id, snapshot).expect_err("second write");
        assert!(matches!(err, StoreError::Immutable(_)));
    }

    #[test]
    fn payment_apply_is_idempotent_under_redelivery() {
        let store = MemoryStore::new();
        store
            .create_customer(customer("LM-00001", "https://site.com/in/jane-doe", "jane@x.com"))
            .expect("creates");
        let record = attempt("LM-00001");
        let id = record.attempt_id;
        store.record_new_attempt(record).expect("records");

        let confirmation = PaymentConfirmation {
            attempt_id: id,
            provider_ref: "pay_123".to_string(),
            amount: Some(49.0),
            status: PaymentState::Succeeded,
            received_at: Utc::now(),
        };

        assert!(store.apply_payment(confirmation.clone()).expect("applies"));
        assert!(!store.apply_payment(confirmation).expect("redelivery is a no-op"));
        let stored = store.payment(&id).expect("lookup").expect("found");
        assert_eq!(stored.provider_ref, "pay_123");
    }
}
