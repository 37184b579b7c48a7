//! Domain model for the capture lifecycle.
//!
//! A capture is one raw task idea travelling through clarification, human
//! review and the external commit. The domain owns every status transition;
//! infrastructure concerns stay outside this boundary.

mod anchor;
mod capture;
mod clarification;
mod error;
mod ids;
mod source;
mod status;

pub use anchor::{
    APPROVAL_ANCHOR_SMART_ADD, Anchor, AnchorExternalState, AnchorId, AnchorKind, AnchorStatus,
    PersistedAnchorData,
};
pub use capture::{
    Capture, CommitFailureKind, CommitResolution, PersistedCaptureData,
};
pub use clarification::{Clarification, ClarificationKind, TaskEntry};
pub use error::{AnchorDomainError, CaptureDomainError, ParseStatusError};
pub use ids::CaptureId;
pub use source::{CaptureSource, RemoteTaskRef};
pub use status::{ClarifyStatus, CommitStatus, DecisionStatus};
