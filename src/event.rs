//! Lifecycle events emitted by a [`GameSession`](crate::session::GameSession).

/// Events delivered on a session's event channel.
///
/// Ordering within one session: at most one `Connected`, always before the
/// single `Terminated`, which is the last event on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server accepted the login and assigned the agent `username`.
    Connected { username: String },
    /// Chat from another player that passed classification.
    Chat { sender: String, text: String },
    /// A non-fatal fault (connect failure, server error, transport error).
    Faulted { error: String },
    /// The session is over. `reason` is `None` for a clean remote close.
    Terminated { reason: Option<String> },
}

impl SessionEvent {
    /// Returns `true` for the terminal event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }
}
