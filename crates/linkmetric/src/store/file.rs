//! File-backed [`AnalysisStore`]. The full table set is held in memory
//! behind one mutex and written as a JSON document after every mutation,
//! temp-file-then-rename like the customer counter, so a crash mid-write
//! leaves the last committed state intact and a restart picks up every
//! customer, attempt, snapshot, and score.

use super::tables::Tables;
use super::{AnalysisStore, StoreError};
use crate::pipeline::domain::{
    Attempt, AttemptId, Customer, CustomerId, PaymentConfirmation, PaymentState, ProfileSnapshot,
    ScrapeState,
};
use crate::pipeline::step::PipelineStep;
use crate::scoring::invoker::ScoreRecord;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub struct FileStore {
    path: PathBuf,
    tables: Mutex<Tables>,
    payment_notify: Arc<Notify>,
}

impl FileStore {
    /// Open the store at `path`, loading any previously persisted state. A
    /// missing file is an empty store; an unreadable one is an error, never
    /// silently discarded.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = match fs::read_to_string(&path) {
            Ok(raw) => {
                serde_json::from_str(&raw).map_err(|err| StoreError::Corrupt(err.to_string()))?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            tables: Mutex::new(tables),
            payment_notify: Arc::new(Notify::new()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("store mutex poisoned")
    }

    /// Run a mutation and persist the result while still holding the lock.
    /// If the write to disk fails, memory is ahead of disk until the next
    /// successful mutation reconverges them.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut tables = self.lock();
        let value = op(&mut tables)?;
        persist(&self.path, &tables)?;
        Ok(value)
    }
}

fn persist(path: &Path, tables: &Tables) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let serialized =
        serde_json::to_string(tables).map_err(|err| StoreError::Corrupt(err.to_string()))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serialized)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl AnalysisStore for FileStore {
    fn create_customer(&self, customer: Customer) -> Result<(), StoreError> {
        self.mutate(|tables| tables.create_customer(customer))
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
        self.mutate(|tables| tables.record_new_attempt(attempt))
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
        self.mutate(|tables| tables.transition(id, to, error_message))
    }

    fn update_payment_state(&self, id: &AttemptId, state: PaymentState) -> Result<(), StoreError> {
        self.mutate(|tables| tables.update_payment_state(id, state))
    }

    fn update_scrape_state(&self, id: &AttemptId, state: ScrapeState) -> Result<(), StoreError> {
        self.mutate(|tables| tables.update_scrape_state(id, state))
    }

    fn put_snapshot(&self, id: &AttemptId, snapshot: ProfileSnapshot) -> Result<(), StoreError> {
        self.mutate(|tables| tables.put_snapshot(id, snapshot))
    }

    fn snapshot(&self, id: &AttemptId) -> Result<Option<ProfileSnapshot>, StoreError> {
        Ok(self.lock().snapshot(id))
    }

    fn put_score_record(&self, record: ScoreRecord) -> Result<(), StoreError> {
        self.mutate(|tables| tables.put_score_record(record))
    }

    fn score_record(&self, id: &AttemptId) -> Result<Option<ScoreRecord>, StoreError> {
        Ok(self.lock().score_record(id))
    }

    fn apply_payment(&self, confirmation: PaymentConfirmation) -> Result<bool, StoreError> {
        let applied = self.mutate(|tables| Ok(tables.apply_payment(confirmation)))?;
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
