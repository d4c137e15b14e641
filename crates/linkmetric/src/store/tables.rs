//! The canonical table set and its write rules, shared by every
//! [`AnalysisStore`](super::AnalysisStore) backing. Records are inserted
//! fully formed, never patched into visibility field by field, and the
//! derived URL/email indexes move in the same call as the primary write.

use super::StoreError;
use crate::pipeline::domain::{
    Attempt, AttemptId, Customer, CustomerId, PaymentConfirmation, PaymentState, ProfileSnapshot,
    ScrapeState,
};
use crate::pipeline::step::PipelineStep;
use crate::scoring::invoker::ScoreRecord;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    customers: HashMap<CustomerId, Customer>,
    customers_by_url: HashMap<String, CustomerId>,
    customers_by_email: HashMap<String, CustomerId>,
    attempts: HashMap<AttemptId, Attempt>,
    attempts_by_customer: HashMap<CustomerId, Vec<AttemptId>>,
    snapshots: HashMap<AttemptId, ProfileSnapshot>,
    scores: HashMap<AttemptId, ScoreRecord>,
    payments: HashMap<AttemptId, PaymentConfirmation>,
}

impl Tables {
    pub(crate) fn create_customer(&mut self, customer: Customer) -> Result<(), StoreError> {
        if self.customers.contains_key(&customer.customer_id)
            || self.customers_by_url.contains_key(&customer.profile_url)
        {
            return Err(StoreError::Conflict);
        }

        self.customers_by_url
            .insert(customer.profile_url.clone(), customer.customer_id.clone());
        self.customers_by_email
            .entry(customer.email.clone())
            .or_insert_with(|| customer.customer_id.clone());
        self.customers
            .insert(customer.customer_id.clone(), customer);
        Ok(())
    }

    pub(crate) fn customer(&self, id: &CustomerId) -> Option<Customer> {
        self.customers.get(id).cloned()
    }

    pub(crate) fn customer_by_profile_url(&self, url: &str) -> Option<Customer> {
        self.customers_by_url
            .get(url)
            .and_then(|id| self.customers.get(id))
            .cloned()
    }

    pub(crate) fn customer_by_email(&self, email: &str) -> Option<Customer> {
        self.customers_by_email
            .get(email)
            .and_then(|id| self.customers.get(id))
            .cloned()
    }

    pub(crate) fn record_new_attempt(&mut self, attempt: Attempt) -> Result<(), StoreError> {
        if self.attempts.contains_key(&attempt.attempt_id) {
            return Err(StoreError::Conflict);
        }

        // Rejected intakes carry no customer; nothing to bump or index.
        if let Some(customer_id) = attempt.customer_id.clone() {
            let customer = self
                .customers
                .get_mut(&customer_id)
                .ok_or(StoreError::NotFound)?;
            customer.total_attempts += 1;
            customer.last_attempt_at = Some(attempt.created_at);

            self.attempts_by_customer
                .entry(customer_id)
                .or_default()
                .push(attempt.attempt_id);
        }
        self.attempts.insert(attempt.attempt_id, attempt);
        Ok(())
    }

    pub(crate) fn attempt(&self, id: &AttemptId) -> Option<Attempt> {
        self.attempts.get(id).cloned()
    }

    pub(crate) fn attempts_for_customer(&self, id: &CustomerId) -> Vec<Attempt> {
        let mut attempts: Vec<Attempt> = self
            .attempts_by_customer
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|attempt_id| self.attempts.get(attempt_id))
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        attempts
    }

    pub(crate) fn transition(
        &mut self,
        id: &AttemptId,
        to: PipelineStep,
        error_message: Option<String>,
    ) -> Result<Attempt, StoreError> {
        let attempt = self.attempts.get_mut(id).ok_or(StoreError::NotFound)?;

        let from = attempt.current_step;
        if !from.can_advance_to(to) {
            return Err(StoreError::IllegalTransition { from, to });
        }

        attempt.current_step = to;
        if let Some(target) = to.progress_target() {
            attempt.progress_percent = attempt.progress_percent.max(target);
        }
        if let Some(message) = error_message {
            attempt.error_message = Some(message);
        }
        if to.is_terminal() {
            attempt.completed_at = Some(Utc::now());
        }

        Ok(attempt.clone())
    }

    pub(crate) fn update_payment_state(
        &mut self,
        id: &AttemptId,
        state: PaymentState,
    ) -> Result<(), StoreError> {
        let attempt = self.attempts.get_mut(id).ok_or(StoreError::NotFound)?;
        attempt.payment_status = state;
        Ok(())
    }

    pub(crate) fn update_scrape_state(
        &mut self,
        id: &AttemptId,
        state: ScrapeState,
    ) -> Result<(), StoreError> {
        let attempt = self.attempts.get_mut(id).ok_or(StoreError::NotFound)?;
        attempt.scrape_status = state;
        Ok(())
    }

    pub(crate) fn put_snapshot(
        &mut self,
        id: &AttemptId,
        snapshot: ProfileSnapshot,
    ) -> Result<(), StoreError> {
        if !self.attempts.contains_key(id) {
            return Err(StoreError::NotFound);
        }
        if self.snapshots.contains_key(id) {
            return Err(StoreError::Immutable(format!(
                "snapshot for attempt {id} is already written"
            )));
        }
        self.snapshots.insert(*id, snapshot);
        Ok(())
    }

    pub(crate) fn snapshot(&self, id: &AttemptId) -> Option<ProfileSnapshot> {
        self.snapshots.get(id).cloned()
    }

    pub(crate) fn put_score_record(&mut self, record: ScoreRecord) -> Result<(), StoreError> {
        if !self.attempts.contains_key(&record.attempt_id) {
            return Err(StoreError::NotFound);
        }
        if self.scores.contains_key(&record.attempt_id) {
            return Err(StoreError::Immutable(format!(
                "score record for attempt {} is already written",
                record.attempt_id
            )));
        }
        self.scores.insert(record.attempt_id, record);
        Ok(())
    }

    pub(crate) fn score_record(&self, id: &AttemptId) -> Option<ScoreRecord> {
        self.scores.get(id).cloned()
    }

    /// Returns `true` when the confirmation was newly applied, `false` on
    /// redelivery of an identical event.
    pub(crate) fn apply_payment(&mut self, confirmation: PaymentConfirmation) -> bool {
        match self.payments.get(&confirmation.attempt_id) {
            Some(existing)
                if existing.provider_ref == confirmation.provider_ref
                    && existing.status == confirmation.status =>
            {
                false
            }
            _ => {
                self.payments
                    .insert(confirmation.attempt_id, confirmation);
                true
            }
        }
    }

    pub(crate) fn payment(&self, id: &AttemptId) -> Option<PaymentConfirmation> {
        self.payments.get(id).cloned()
    }
}
