//! Relay session states.

use std::fmt;

/// Where a session is in its encoder lifecycle.
///
/// ```text
/// Idle --start--> Starting --started--> Ready
/// Starting|Ready --ended / stop / disconnect--> Stopped
/// Starting|Ready --errored / startup timeout--> Failed
/// Stopped|Failed --start--> Starting (fresh process)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Ready,
    Stopped,
    Failed,
}

impl SessionState {
    /// A process exists and has not reported a terminal event.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Ready)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
