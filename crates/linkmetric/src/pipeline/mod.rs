//! The fixed analysis pipeline: step state machine, intake validation,
//! domain records, the scrape job poller, and the runner that drives one
//! attempt from intake to a terminal step.

pub mod domain;
pub mod intake;
pub mod poller;
pub mod runner;
pub mod step;

pub use domain::{
    Attempt, AttemptId, Customer, CustomerId, PaymentConfirmation, PaymentState, ProfileSnapshot,
    ScrapeState, TargetAudience,
};
pub use intake::{IntakeError, IntakeRequest, ValidatedIntake};
pub use poller::{JobHandle, JobPoll, PollError, PollPolicy, ProviderError, ScrapeJobPoller, ScrapeProvider};
pub use runner::{PipelineError, PipelineRunner, StartReceipt};
pub use step::PipelineStep;
