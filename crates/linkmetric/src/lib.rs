//! Workflow orchestration core for the LinkMetric profile analysis pipeline.
//!
//! The crate sequences one fixed pipeline per analysis attempt: intake and
//! validation, customer id allocation, a payment gate, an external scrape job
//! tracked by a backoff poller, an AI scoring pass, and durable persistence
//! with attempt-to-attempt comparison. External collaborators (the scraping
//! provider, the scoring capability, the payment gateway) are consumed behind
//! trait seams so the pipeline can be exercised end-to-end in tests.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod scoring;
pub mod store;
pub mod telemetry;
