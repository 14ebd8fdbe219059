// src/lockdown/mod.rs
//
// The lockdown session core: violation classification, warning escalation,
// exactly-once submission and the restricted-window release protocol.
// A kiosk shell embeds this module through `session::start_session` and the
// `host::HostWindowController` trait; the quiz backend in the rest of this
// crate is the scoring service it submits to.

pub mod escalation;
pub mod host;
pub mod session;
pub mod submit;
pub mod violation;

pub use escalation::{EscalationAction, EscalationState, Phase};
pub use host::{
    EventHub, HostError, HostEvent, HostWindowController, Subscription, release_lockdown,
};
pub use session::{Answer, SessionConfig, SessionHandle, SessionSnapshot, start_session};
pub use submit::{
    AnswerPayload, AttemptPayload, AttemptResult, HttpScoringClient, ScoringClient,
    SubmissionCoordinator, SubmissionReason, SubmitError,
};
pub use violation::{RawSignal, Severity, Violation, ViolationKind, classify};
