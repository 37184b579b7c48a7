//! Application services for the capture lifecycle.

mod anchor;
mod circuit_breaker;
mod clarification;
mod commit;
mod intake;
mod retry_policy;
mod review;

pub use anchor::{AnchorError, AnchorOutcome, AnchorResult, ApprovalAnchorService};
pub use circuit_breaker::{Admission, CircuitBreakerConfig, CircuitState, CommitCircuitBreaker};
pub use clarification::{
    ClarificationConfig, ClarificationError, ClarificationOrchestrator, ClarificationReport,
    ClarificationResult,
};
pub use commit::{CommitConfig, CommitError, CommitOrchestrator, CommitReport, CommitResult};
pub use intake::{CaptureIntakeService, IngestOutcome, IngestReport, IntakeError, IntakeResult};
pub use retry_policy::{ClarifyRetryPolicy, RetryDecision};
pub use review::{ReviewError, ReviewResult, ReviewService};
