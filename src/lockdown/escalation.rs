// src/lockdown/escalation.rs

use serde::Serialize;

use crate::config::MAX_WARNINGS;

/// Phase of one quiz attempt.
///
/// `Active` and `Warning` are the only phases that accept new violations.
/// Once `Submitting` is reached the phase never returns to either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Active,
    Warning,
    Escalating,
    Submitting,
    Terminated,
}

/// What the session should do in response to a processed violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationAction {
    /// Show a transient warning ("count/max") and revert to Active after
    /// the display delay.
    Warn { count: u32, max: u32 },
    /// Threshold crossed: show the terminal notice and submit after the
    /// grace delay.
    Escalate,
    /// Violation arrived outside Active/Warning; no processing.
    Ignored,
}

/// Warning counter and phase for a single attempt.
///
/// The counter is monotonic non-decreasing. All paths into `Submitting`
/// funnel through `begin_submitting`, which is a plain check-and-set on
/// state owned by one actor task, so a second trigger can never win.
#[derive(Debug)]
pub struct EscalationState {
    warning_count: u32,
    phase: Phase,
}

impl EscalationState {
    pub fn new() -> Self {
        Self {
            warning_count: 0,
            phase: Phase::Active,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    /// Process one classified violation.
    pub fn on_violation(&mut self) -> EscalationAction {
        match self.phase {
            Phase::Active | Phase::Warning => {
                self.warning_count += 1;
                if self.warning_count >= MAX_WARNINGS {
                    self.phase = Phase::Escalating;
                    EscalationAction::Escalate
                } else {
                    self.phase = Phase::Warning;
                    EscalationAction::Warn {
                        count: self.warning_count,
                        max: MAX_WARNINGS,
                    }
                }
            }
            Phase::Escalating | Phase::Submitting | Phase::Terminated => {
                EscalationAction::Ignored
            }
        }
    }

    /// Warning display expired: Warning reverts to Active. The counter is
    /// untouched. No-op in any other phase.
    pub fn revert_warning(&mut self) {
        if self.phase == Phase::Warning {
            self.phase = Phase::Active;
        }
    }

    /// Transition into `Submitting`. Returns `true` only for the caller
    /// that actually performed the transition; the violation-threshold
    /// path and the countdown-expiry path both go through here.
    pub fn begin_submitting(&mut self) -> bool {
        match self.phase {
            Phase::Active | Phase::Warning | Phase::Escalating => {
                self.phase = Phase::Submitting;
                true
            }
            Phase::Submitting | Phase::Terminated => false,
        }
    }

    pub fn terminate(&mut self) {
        self.phase = Phase::Terminated;
    }
}

impl Default for EscalationState {
    fn default() -> Self {
        Self::new()
    }
}
