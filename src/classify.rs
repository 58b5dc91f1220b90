//! Classification of incoming server messages.
//!
//! Only genuine player chat is surfaced. HUD text, status overlays that
//! servers push through the chat channel, anonymous system lines and the
//! agent's own echoes are dropped here so nothing downstream has to guess.

use std::sync::LazyLock;

use regex::Regex;

use crate::protocol::MessageChannel;

/// `12/20? ... Mana` style status bars (case-insensitive).
static MANA_OVERLAY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\d+/\d+\??\s+.*Mana").ok());

/// `18/20❤` health readouts.
static HEALTH_OVERLAY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d+/\d+❤").ok());

/// Result of classifying one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Delivered on the HUD channel.
    Hud,
    /// Matches a status-overlay pattern.
    Overlay,
    /// Sent by the agent itself.
    SelfEcho,
    /// No usable sender (system line or blank name).
    Anonymous,
    /// Real chat from another player.
    Chat { sender: String, text: String },
}

impl Classification {
    /// Returns `true` if the message should surface as a chat event.
    pub fn is_chat(&self) -> bool {
        matches!(self, Self::Chat { .. })
    }
}

/// Returns `true` if `text` looks like a HUD overlay (mana or health bar).
pub fn is_overlay_text(text: &str) -> bool {
    [&*MANA_OVERLAY, &*HEALTH_OVERLAY]
        .into_iter()
        .flatten()
        .any(|re| re.is_match(text))
}

/// Classify a message received on `channel`.
///
/// `self_name` is the identity the server assigned to the agent; pass
/// `None` before the session has spawned.
pub fn classify(
    channel: MessageChannel,
    sender: Option<&str>,
    text: &str,
    self_name: Option<&str>,
) -> Classification {
    if channel == MessageChannel::ActionBar {
        return Classification::Hud;
    }
    if is_overlay_text(text) {
        return Classification::Overlay;
    }
    let sender = match sender.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return Classification::Anonymous,
    };
    if self_name == Some(sender) {
        return Classification::SelfEcho;
    }
    Classification::Chat {
        sender: sender.to_string(),
        text: text.to_string(),
    }
}
