//! Durable, indexed storage for customers, attempts, snapshots, score
//! records, and payment confirmations, exposing exactly the access patterns
//! the pipeline needs: point lookups by attempt and customer id, returning-
//! user lookup by normalized URL or email, and most-recent-first attempt
//! history.

pub mod activity;
pub mod allocator;
pub mod file;
pub mod memory;
mod tables;

use crate::pipeline::domain::{
    Attempt, AttemptId, Customer, CustomerId, PaymentConfirmation, PaymentState, ProfileSnapshot,
    ScrapeState,
};
use crate::pipeline::step::PipelineStep;
use crate::scoring::invoker::ScoreRecord;
use std::sync::Arc;
use tokio::sync::Notify;

pub use activity::{ActivityLog, ActivityLogEntry, LogStatus};
pub use allocator::{CustomerIdAllocator, FileSequence, MemorySequence, Sequence, SequenceError};
pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record is immutable: {0}")]
    Immutable(String),
    #[error("illegal transition from {from:?} to {to:?}")]
    IllegalTransition { from: PipelineStep, to: PipelineStep },
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is corrupt: {0}")]
    Corrupt(String),
}

/// Storage abstraction for the pipeline. Implementations must make a record
/// visible to readers only once fully written, and must keep the derived
/// URL/email indexes in step with the primary customer write.
pub trait AnalysisStore: Send + Sync {
    // Customers.
    fn create_customer(&self, customer: Customer) -> Result<(), StoreError>;
    fn customer(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError>;
    fn customer_by_profile_url(&self, url: &str) -> Result<Option<Customer>, StoreError>;
    fn customer_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError>;

    // Attempts. When the attempt carries a customer, `record_new_attempt`
    // also bumps that customer's total_attempts and last_attempt_at under
    // the same write.
    fn record_new_attempt(&self, attempt: Attempt) -> Result<(), StoreError>;
    fn attempt(&self, id: &AttemptId) -> Result<Option<Attempt>, StoreError>;
    fn attempts_for_customer(&self, id: &CustomerId) -> Result<Vec<Attempt>, StoreError>;

    /// Advance an attempt's step and progress atomically. Rejects illegal
    /// transitions and transitions out of a terminal step; progress never
    /// decreases. Sets `completed_at` when `to` is terminal and stores
    /// `error_message` when given.
    fn transition(
        &self,
        id: &AttemptId,
        to: PipelineStep,
        error_message: Option<String>,
    ) -> Result<Attempt, StoreError>;

    fn update_payment_state(&self, id: &AttemptId, state: PaymentState) -> Result<(), StoreError>;
    fn update_scrape_state(&self, id: &AttemptId, state: ScrapeState) -> Result<(), StoreError>;

    // Write-once artifacts.
    fn put_snapshot(&self, id: &AttemptId, snapshot: ProfileSnapshot) -> Result<(), StoreError>;
    fn snapshot(&self, id: &AttemptId) -> Result<Option<ProfileSnapshot>, StoreError>;
    fn put_score_record(&self, record: ScoreRecord) -> Result<(), StoreError>;
    fn score_record(&self, id: &AttemptId) -> Result<Option<ScoreRecord>, StoreError>;

    /// Apply a payment confirmation. Idempotent under redelivery: returns
    /// `true` when the confirmation was newly applied, `false` when an
    /// identical event had already been seen.
    fn apply_payment(&self, confirmation: PaymentConfirmation) -> Result<bool, StoreError>;
    fn payment(&self, id: &AttemptId) -> Result<Option<PaymentConfirmation>, StoreError>;

    /// Notifier signalled whenever a payment confirmation lands, so the
    /// payment gate can wait without polling the store.
    fn payment_notifier(&self) -> Arc<Notify>;
}
