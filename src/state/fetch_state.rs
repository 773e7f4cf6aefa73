/// Fetch state machine for one "get the page for ID X" operation
///
/// The blank-page ladder is:
///
/// ```text
/// Attempt1 --blank--> ShortDelayRetry --wait--> Attempt2 --blank--> LongCooldown
///          --wait--> FinalAttempt --blank--> BanSuspected
/// ```
///
/// Any attempt that returns content moves to `Success`. A transport error at any
/// attempt moves straight to `TransientFailure` without advancing the ladder.
use std::fmt;

/// Current state of a fetch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchState {
    // ===== Attempt States =====
    /// First request for the page
    Attempt1,

    /// Second request, after a blank first response
    Attempt2,

    /// Last request, after the long cooldown
    FinalAttempt,

    // ===== Wait States =====
    /// Short fixed pause after the first blank page
    ShortDelayRetry,

    /// Long cooldown after the second blank page
    LongCooldown,

    // ===== Terminal States =====
    /// Non-blank content was received
    Success,

    /// Three blank pages in a row; fatal for the session
    BanSuspected,

    /// Timeout, connection failure or non-2xx status
    TransientFailure,
}

/// Event that drives a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchEvent {
    /// The attempt returned non-blank content
    Content,

    /// The attempt returned an empty or all-whitespace body
    Blank,

    /// The attempt failed at the transport or HTTP level
    TransportError,

    /// A wait state's pause has elapsed
    WaitElapsed,
}

impl FetchState {
    /// Applies an event and returns the next state
    ///
    /// Returns None when the event is not valid in the current state.
    pub fn transition(self, event: FetchEvent) -> Option<FetchState> {
        use FetchEvent::*;
        use FetchState::*;

        let next = match (self, event) {
            (Attempt1 | Attempt2 | FinalAttempt, Content) => Success,
            (Attempt1 | Attempt2 | FinalAttempt, TransportError) => TransientFailure,
            (Attempt1, Blank) => ShortDelayRetry,
            (ShortDelayRetry, WaitElapsed) => Attempt2,
            (Attempt2, Blank) => LongCooldown,
            (LongCooldown, WaitElapsed) => FinalAttempt,
            (FinalAttempt, Blank) => BanSuspected,
            _ => return None,
        };
        Some(next)
    }

    /// Returns true if a request is issued in this state
    pub fn is_attempt(&self) -> bool {
        matches!(self, Self::Attempt1 | Self::Attempt2 | Self::FinalAttempt)
    }

    /// Returns true if this state only waits
    pub fn is_wait(&self) -> bool {
        matches!(self, Self::ShortDelayRetry | Self::LongCooldown)
    }

    /// Returns true if the state machine has finished
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::BanSuspected | Self::TransientFailure
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attempt1 => "attempt_1",
            Self::Attempt2 => "attempt_2",
            Self::FinalAttempt => "final_attempt",
            Self::ShortDelayRetry => "short_delay_retry",
            Self::LongCooldown => "long_cooldown",
            Self::Success => "success",
            Self::BanSuspected => "ban_suspected",
            Self::TransientFailure => "transient_failure",
        }
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
