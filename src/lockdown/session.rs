// src/lockdown/session.rs

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use crate::config::{ESCALATION_GRACE, POST_SUBMIT_DELAY, WARNING_DISPLAY};

use super::escalation::{EscalationAction, EscalationState, Phase};
use super::host::{EventHub, HostWindowController, Subscription, release_lockdown};
use super::submit::{
    AttemptResult, ScoringClient, SubmissionCoordinator, SubmissionReason, SubmitError,
};
use super::violation::{RawSignal, Violation, classify};

/// A student's current answer to one question: either a selected-option
/// reference or a free-text response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Choice { option_id: i64 },
    Text { text: String },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub student_id: i64,
    pub quiz_id: i64,
    pub duration_secs: u64,
    /// Fixed at session creation; when false the escalation machine is
    /// inactive and raw signals are discarded.
    pub lockdown_mode: bool,
}

/// Commands accepted by the session actor. The quiz UI and the host-event
/// forwarding path both feed this channel; the actor is the single writer
/// of all session state.
#[derive(Debug)]
enum SessionCommand {
    RecordAnswer { question_id: i64, answer: Answer },
    RawSignal(RawSignal),
    Submit,
    Shutdown,
}

/// Observable session state, published on every transition.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub warning_count: u32,
    pub last_warning: Option<String>,
    pub violation_log: Vec<Violation>,
    pub time_remaining_secs: u64,
    /// Set while a retryable submission failure is pending.
    pub submit_error: Option<String>,
    pub result: Option<AttemptResult>,
}

/// Handle owned by the quiz UI layer.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn record_answer(&self, question_id: i64, answer: Answer) {
        let _ = self
            .cmd_tx
            .send(SessionCommand::RecordAnswer { question_id, answer });
    }

    /// Feed a page-level raw signal (visibilitychange, blur). Host-level
    /// signals arrive through the controller's event hub instead.
    pub fn raw_signal(&self, signal: RawSignal) {
        let _ = self.cmd_tx.send(SessionCommand::RawSignal(signal));
    }

    /// Manual submission. Also retries a submission that failed with a
    /// retryable error.
    pub fn submit(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Submit);
    }

    /// Abandon the session without submitting (e.g. the shell is closing).
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown);
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }
}

/// Start one quiz attempt. Spawns the actor task, opens the restricted
/// window (lockdown only) and binds the host event callbacks; the returned
/// handle is the only way in.
pub fn start_session(
    config: SessionConfig,
    scoring: Arc<dyn ScoringClient>,
    host: Option<Arc<dyn HostWindowController>>,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
        phase: Phase::Active,
        warning_count: 0,
        last_warning: None,
        violation_log: Vec::new(),
        time_remaining_secs: config.duration_secs,
        submit_error: None,
        result: None,
    });

    let mut subscriptions = Vec::new();
    if config.lockdown_mode {
        if let Some(host) = &host {
            subscriptions = bind_host_events(host.events(), &cmd_tx);
        }
    }

    let coordinator = SubmissionCoordinator::new(scoring, config.student_id, config.quiz_id);
    let actor = SessionActor {
        time_remaining: config.duration_secs,
        config,
        escalation: EscalationState::new(),
        answers: HashMap::new(),
        violation_log: Vec::new(),
        warning_revert_at: None,
        escalate_at: None,
        pending_reason: None,
        last_warning: None,
        submit_error: None,
        result: None,
        coordinator,
        host,
        subscriptions,
        snapshot_tx,
    };
    tokio::spawn(actor.run(cmd_rx));

    SessionHandle {
        cmd_tx,
        snapshot_rx,
    }
}

/// Register one subscription per host event kind, each forwarding into the
/// command channel. All handles are cancelled at teardown.
fn bind_host_events(
    hub: &EventHub,
    cmd_tx: &mpsc::UnboundedSender<SessionCommand>,
) -> Vec<Subscription> {
    let tx = cmd_tx.clone();
    let blur = hub.on_blur(move || {
        let _ = tx.send(SessionCommand::RawSignal(RawSignal::HostBlur));
    });

    let tx = cmd_tx.clone();
    let fullscreen = hub.on_leave_fullscreen(move || {
        let _ = tx.send(SessionCommand::RawSignal(RawSignal::HostLeaveFullscreen));
    });

    let tx = cmd_tx.clone();
    let minimize = hub.on_minimize_attempt(move || {
        let _ = tx.send(SessionCommand::RawSignal(RawSignal::HostMinimizeAttempt));
    });

    let tx = cmd_tx.clone();
    let close = hub.on_close_attempt(move || {
        let _ = tx.send(SessionCommand::RawSignal(RawSignal::HostCloseAttempt));
    });

    let tx = cmd_tx.clone();
    let chord = hub.on_forbidden_key_chord(move |raw| {
        let _ = tx.send(SessionCommand::RawSignal(RawSignal::HostKeyChord(
            raw.to_string(),
        )));
    });

    vec![blur, fullscreen, minimize, close, chord]
}

struct SessionActor {
    config: SessionConfig,
    escalation: EscalationState,
    answers: HashMap<i64, Answer>,
    violation_log: Vec<Violation>,
    time_remaining: u64,
    warning_revert_at: Option<Instant>,
    escalate_at: Option<Instant>,
    /// Reason of the in-flight submission; a retry reuses it.
    pending_reason: Option<SubmissionReason>,
    last_warning: Option<String>,
    submit_error: Option<String>,
    result: Option<AttemptResult>,
    coordinator: SubmissionCoordinator,
    host: Option<Arc<dyn HostWindowController>>,
    subscriptions: Vec<Subscription>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        if self.config.lockdown_mode {
            if let Some(host) = self.host.clone() {
                if let Err(e) = host.open_restricted_window(self.config.quiz_id).await {
                    tracing::warn!("failed to open restricted window: {}", e);
                }
            }
        }

        let mut countdown = time::interval_at(
            Instant::now() + Duration::from_secs(1),
            Duration::from_secs(1),
        );
        countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if self.escalation.phase() == Phase::Terminated {
                break;
            }

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                _ = countdown.tick(), if self.countdown_running() => {
                    self.on_countdown_tick().await;
                }
                _ = sleep_until_opt(self.warning_revert_at), if self.warning_revert_at.is_some() => {
                    self.warning_revert_at = None;
                    self.escalation.revert_warning();
                    self.publish();
                }
                _ = sleep_until_opt(self.escalate_at), if self.escalate_at.is_some() => {
                    self.escalate_at = None;
                    self.force_submit(SubmissionReason::AutoSubmitted).await;
                }
            }
        }

        self.teardown();
    }

    fn countdown_running(&self) -> bool {
        self.time_remaining > 0
            && matches!(
                self.escalation.phase(),
                Phase::Active | Phase::Warning | Phase::Escalating
            )
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::RecordAnswer {
                question_id,
                answer,
            } => {
                // Answers stay mutable until the submission is actually sent.
                if !matches!(
                    self.escalation.phase(),
                    Phase::Submitting | Phase::Terminated
                ) {
                    self.answers.insert(question_id, answer);
                }
            }
            SessionCommand::RawSignal(signal) => {
                if !self.config.lockdown_mode {
                    return;
                }
                if let Some(violation) = classify(&signal) {
                    self.process_violation(violation);
                }
            }
            SessionCommand::Submit => match self.escalation.phase() {
                Phase::Active | Phase::Warning => {
                    self.force_submit(SubmissionReason::Manual).await;
                }
                Phase::Submitting if !self.coordinator.submitted() => {
                    // Retry after a retryable failure, keeping the reason
                    // that originally forced the submission.
                    self.attempt_submission().await;
                }
                _ => {}
            },
            SessionCommand::Shutdown => {
                self.warning_revert_at = None;
                self.escalate_at = None;
                self.escalation.terminate();
            }
        }
    }

    fn process_violation(&mut self, violation: Violation) {
        match self.escalation.on_violation() {
            EscalationAction::Warn { count, max } => {
                self.last_warning =
                    Some(format!("Warning {}/{}: {}", count, max, violation.message));
                self.violation_log.push(violation);
                self.warning_revert_at = Some(Instant::now() + WARNING_DISPLAY);
                self.publish();
            }
            EscalationAction::Escalate => {
                self.last_warning = Some(
                    "Maximum violations reached. Your quiz will be submitted automatically."
                        .to_string(),
                );
                self.violation_log.push(violation);
                self.warning_revert_at = None;
                self.escalate_at = Some(Instant::now() + ESCALATION_GRACE);
                self.publish();
            }
            EscalationAction::Ignored => {
                tracing::debug!("violation ignored, attempt already being submitted");
            }
        }
    }

    async fn on_countdown_tick(&mut self) {
        self.time_remaining = self.time_remaining.saturating_sub(1);
        if self.time_remaining == 0 {
            match self.escalation.phase() {
                // No grace delay on timeout, and no unanswered-question
                // confirmation either.
                Phase::Active | Phase::Warning => {
                    self.force_submit(SubmissionReason::Timeout).await;
                }
                // Threshold already crossed; the grace timer owns submission.
                _ => self.publish(),
            }
        } else {
            self.publish();
        }
    }

    /// Single entry into `Submitting`. Loses (and does nothing) if another
    /// trigger already won the transition.
    async fn force_submit(&mut self, reason: SubmissionReason) {
        if !self.escalation.begin_submitting() {
            return;
        }
        // Cancel pending timers so no stale warning revert or second
        // trigger fires mid-submission.
        self.warning_revert_at = None;
        self.escalate_at = None;
        self.pending_reason = Some(reason);
        self.publish();
        self.attempt_submission().await;
    }

    async fn attempt_submission(&mut self) {
        let reason = self.pending_reason.unwrap_or(SubmissionReason::Manual);
        match self
            .coordinator
            .submit(&self.answers, &self.violation_log, reason)
            .await
        {
            Ok(result) => {
                self.submit_error = None;
                self.result = Some(result);
                self.publish();
                self.finish().await;
            }
            Err(SubmitError::Retryable(message)) => {
                tracing::warn!("attempt submission failed, retry available: {}", message);
                self.submit_error = Some(message);
                self.publish();
            }
            Err(SubmitError::AlreadyAttempted(message)) => {
                tracing::error!("attempt rejected as duplicate: {}", message);
                self.submit_error = Some(message);
                self.escalation.terminate();
            }
        }
    }

    /// Post-success path: run the release protocol (lockdown) or just hold
    /// the confirmation on screen, then terminate.
    async fn finish(&mut self) {
        match (self.config.lockdown_mode, self.host.clone()) {
            (true, Some(host)) => release_lockdown(host.as_ref()).await,
            _ => time::sleep(POST_SUBMIT_DELAY).await,
        }
        self.escalation.terminate();
    }

    fn teardown(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
        if self.escalation.phase() != Phase::Terminated {
            self.escalation.terminate();
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            phase: self.escalation.phase(),
            warning_count: self.escalation.warning_count(),
            last_warning: self.last_warning.clone(),
            violation_log: self.violation_log.clone(),
            time_remaining_secs: self.time_remaining,
            submit_error: self.submit_error.clone(),
            result: self.result.clone(),
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
