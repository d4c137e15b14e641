use serde::{Deserialize, Serialize};

/// One step of the fixed analysis pipeline.
///
/// The happy path advances strictly along [`PipelineStep::ordered`]. `Failed`
/// is reachable from every non-terminal step; `InvalidUrl` and `NotFound` are
/// immediate-failure variants reachable only from the first two steps. The
/// full legal-transition set lives in [`PipelineStep::can_advance_to`] so it
/// stays enumerable and testable instead of being scattered across call
/// sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Intake,
    Validated,
    Allocated,
    PaymentPending,
    PaymentConfirmed,
    Scraping,
    ScrapingComplete,
    Scoring,
    Complete,
    Failed,
    InvalidUrl,
    NotFound,
}

impl PipelineStep {
    /// The happy path, in required order.
    pub fn ordered() -> [PipelineStep; 9] {
        [
            PipelineStep::Intake,
            PipelineStep::Validated,
            PipelineStep::Allocated,
            PipelineStep::PaymentPending,
            PipelineStep::PaymentConfirmed,
            PipelineStep::Scraping,
            PipelineStep::ScrapingComplete,
            PipelineStep::Scoring,
            PipelineStep::Complete,
        ]
    }

    /// The next step along the happy path, if any.
    pub fn successor(self) -> Option<PipelineStep> {
        let order = Self::ordered();
        order
            .iter()
            .position(|step| *step == self)
            .and_then(|idx| order.get(idx + 1).copied())
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineStep::Complete
                | PipelineStep::Failed
                | PipelineStep::InvalidUrl
                | PipelineStep::NotFound
        )
    }

    /// Whether a transition from `self` to `next` is legal.
    pub fn can_advance_to(self, next: PipelineStep) -> bool {
        if self.is_terminal() {
            return false;
        }

        match next {
            PipelineStep::Failed => true,
            PipelineStep::InvalidUrl | PipelineStep::NotFound => {
                matches!(self, PipelineStep::Intake | PipelineStep::Validated)
            }
            _ => self.successor() == Some(next),
        }
    }

    /// Client-visible progress for a step. Terminal failure variants carry no
    /// target of their own; the attempt's progress freezes where it stood.
    pub fn progress_target(self) -> Option<u8> {
        match self {
            PipelineStep::Intake => Some(5),
            PipelineStep::Validated => Some(10),
            PipelineStep::Allocated => Some(15),
            PipelineStep::PaymentPending => Some(20),
            PipelineStep::PaymentConfirmed => Some(30),
            PipelineStep::Scraping => Some(40),
            PipelineStep::ScrapingComplete => Some(70),
            PipelineStep::Scoring => Some(80),
            PipelineStep::Complete => Some(100),
            PipelineStep::Failed | PipelineStep::InvalidUrl | PipelineStep::NotFound => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PipelineStep::Intake => "Intake",
            PipelineStep::Validated => "Validated",
            PipelineStep::Allocated => "Customer Allocated",
            PipelineStep::PaymentPending => "Awaiting Payment",
            PipelineStep::PaymentConfirmed => "Payment Confirmed",
            PipelineStep::Scraping => "Scraping Profile",
            PipelineStep::ScrapingComplete => "Scrape Complete",
            PipelineStep::Scoring => "Scoring",
            PipelineStep::Complete => "Complete",
            PipelineStep::Failed => "Failed",
            PipelineStep::InvalidUrl => "Invalid URL",
            PipelineStep::NotFound => "Profile Not Found",
        }
    }
}
