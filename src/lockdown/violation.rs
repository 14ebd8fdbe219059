// src/lockdown/violation.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed taxonomy of detectable cheating signals.
///
/// Severity and message are fixed per kind; the tables live on this enum so
/// taxonomy additions stay localized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    WindowBlur,
    TabHidden,
    FullscreenExit,
    MinimizeAttempt,
    CloseAttempt,
    AltTab,
    WindowsKey,
    F11Key,
    EscapeKey,
    AltF4,
    DevtoolsShortcut,
    RefreshShortcut,
}

/// Severity of a violation, fixed per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl ViolationKind {
    pub fn severity(self) -> Severity {
        match self {
            Self::CloseAttempt | Self::AltF4 | Self::AltTab | Self::FullscreenExit => {
                Severity::High
            }
            Self::WindowBlur
            | Self::TabHidden
            | Self::MinimizeAttempt
            | Self::WindowsKey
            | Self::DevtoolsShortcut
            | Self::RefreshShortcut => Severity::Medium,
            Self::F11Key | Self::EscapeKey => Severity::Low,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::WindowBlur => "Quiz window lost focus",
            Self::TabHidden => "Quiz tab was hidden",
            Self::FullscreenExit => "Left fullscreen mode",
            Self::MinimizeAttempt => "Attempted to minimize the quiz window",
            Self::CloseAttempt => "Attempted to close the quiz window",
            Self::AltTab => "Attempted to switch windows (Alt+Tab)",
            Self::WindowsKey => "Pressed the Windows/Super key",
            Self::F11Key => "Pressed F11",
            Self::EscapeKey => "Pressed Escape",
            Self::AltF4 => "Attempted to close the window (Alt+F4)",
            Self::DevtoolsShortcut => "Attempted to open developer tools",
            Self::RefreshShortcut => "Attempted to refresh the page",
        }
    }
}

/// One detected cheating signal. Created by `classify`, appended to the
/// session's violation log, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl Violation {
    pub fn new(kind: ViolationKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
            severity: kind.severity(),
            timestamp: Utc::now(),
        }
    }
}

/// A raw signal from one of the two detection layers.
///
/// Page-level signals come from in-page document/window events and fire even
/// without a host controller; host-level signals are forwarded by the
/// restricted-window controller. Both layers may report the same user action
/// (a host blur and a page blur for one Alt-Tab); each raw signal yields its
/// own violation. False positives are preferred over missed detections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSignal {
    PageBlur,
    PageVisibilityHidden,
    HostBlur,
    HostLeaveFullscreen,
    HostMinimizeAttempt,
    HostCloseAttempt,
    HostKeyChord(String),
}

/// Classify a raw signal into a violation record.
///
/// Pure function. Key chords that do not match the forbidden table (or are
/// malformed) return `None` and are dropped without surfacing anything.
pub fn classify(signal: &RawSignal) -> Option<Violation> {
    let kind = match signal {
        RawSignal::PageBlur | RawSignal::HostBlur => ViolationKind::WindowBlur,
        RawSignal::PageVisibilityHidden => ViolationKind::TabHidden,
        RawSignal::HostLeaveFullscreen => ViolationKind::FullscreenExit,
        RawSignal::HostMinimizeAttempt => ViolationKind::MinimizeAttempt,
        RawSignal::HostCloseAttempt => ViolationKind::CloseAttempt,
        RawSignal::HostKeyChord(chord) => forbidden_chord(chord)?,
    };
    Some(Violation::new(kind))
}

/// Fixed table of forbidden key combinations.
fn forbidden_chord(chord: &str) -> Option<ViolationKind> {
    match chord.trim().to_ascii_lowercase().as_str() {
        "alt+tab" => Some(ViolationKind::AltTab),
        "meta" | "super" => Some(ViolationKind::WindowsKey),
        "f11" => Some(ViolationKind::F11Key),
        "escape" | "esc" => Some(ViolationKind::EscapeKey),
        "alt+f4" => Some(ViolationKind::AltF4),
        "ctrl+shift+i" => Some(ViolationKind::DevtoolsShortcut),
        "ctrl+r" => Some(ViolationKind::RefreshShortcut),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_table_is_fixed() {
        assert_eq!(ViolationKind::CloseAttempt.severity(), Severity::High);
        assert_eq!(ViolationKind::AltF4.severity(), Severity::High);
        assert_eq!(ViolationKind::AltTab.severity(), Severity::High);
        assert_eq!(ViolationKind::FullscreenExit.severity(), Severity::High);
        assert_eq!(ViolationKind::MinimizeAttempt.severity(), Severity::Medium);
        assert_eq!(ViolationKind::DevtoolsShortcut.severity(), Severity::Medium);
        assert_eq!(ViolationKind::RefreshShortcut.severity(), Severity::Medium);
        assert_eq!(ViolationKind::EscapeKey.severity(), Severity::Low);
    }

    #[test]
    fn page_and_host_blur_map_to_same_kind() {
        let page = classify(&RawSignal::PageBlur).unwrap();
        let host = classify(&RawSignal::HostBlur).unwrap();
        assert_eq!(page.kind, ViolationKind::WindowBlur);
        assert_eq!(host.kind, ViolationKind::WindowBlur);
    }

    #[test]
    fn forbidden_chords_classify_case_insensitively() {
        let cases = [
            ("Alt+Tab", ViolationKind::AltTab),
            ("META", ViolationKind::WindowsKey),
            ("f11", ViolationKind::F11Key),
            ("Esc", ViolationKind::EscapeKey),
            ("alt+f4", ViolationKind::AltF4),
            ("Ctrl+Shift+I", ViolationKind::DevtoolsShortcut),
            ("ctrl+r", ViolationKind::RefreshShortcut),
        ];
        for (chord, expected) in cases {
            let v = classify(&RawSignal::HostKeyChord(chord.to_string())).unwrap();
            assert_eq!(v.kind, expected, "chord {chord}");
            assert_eq!(v.message, expected.message());
        }
    }

    #[test]
    fn unknown_chords_are_dropped() {
        assert!(classify(&RawSignal::HostKeyChord("ctrl+c".into())).is_none());
        assert!(classify(&RawSignal::HostKeyChord("".into())).is_none());
        assert!(classify(&RawSignal::HostKeyChord("garbage+++".into())).is_none());
    }
}
