//! JSON bridge protocol spoken with the game server.
//!
//! The agent does not implement the game's binary wire format. It talks to a
//! protocol bridge that owns the real client (movement, pathing, auto-eat)
//! and exchanges one JSON object per text frame. Every message carries a
//! `"type"` tag in `snake_case`.

use serde::{Deserialize, Serialize};

// ── Enums ───────────────────────────────────────────────────────────

/// Delivery channel of an incoming server message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    /// Player chat.
    #[default]
    Chat,
    /// Server/system announcements.
    System,
    /// Ephemeral heads-up-display text shown above the hotbar.
    ActionBar,
}

/// What the auto-eat behavior optimizes when choosing food.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FoodPriority {
    #[default]
    FoodPoints,
    Saturation,
}

// ── Structs ─────────────────────────────────────────────────────────

/// Options forwarded to the bridge's auto-eat behavior once the agent spawns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoEatOptions {
    pub priority: FoodPriority,
    /// Hunger level at or below which the agent starts eating.
    pub start_at: u8,
    /// Item names the agent must never eat.
    #[serde(default)]
    pub banned_food: Vec<String>,
}

impl Default for AutoEatOptions {
    fn default() -> Self {
        Self {
            priority: FoodPriority::FoodPoints,
            start_at: 14,
            banned_food: Vec::new(),
        }
    }
}

// ── Client → server ─────────────────────────────────────────────────

/// Messages sent from the agent to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the server. Always the first message on a connection.
    Login {
        username: String,
        /// Protocol version; `None` lets the bridge auto-detect.
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// Say something in chat.
    Chat { message: String },
    /// Configure the auto-eat behavior.
    ConfigureAutoEat(AutoEatOptions),
    /// Leave the server.
    Quit,
}

// ── Server → client ─────────────────────────────────────────────────

/// Messages received from the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Login accepted; `username` is the identity the server assigned.
    /// Sent again on every respawn.
    Spawned { username: String },
    /// A text message delivered on some channel.
    Message {
        #[serde(default)]
        channel: MessageChannel,
        text: String,
        /// Originating player, absent for system lines.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
    },
    /// The server removed the agent.
    Kicked { reason: String },
    /// A non-fatal protocol error.
    Error { message: String },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn login_omits_missing_version() {
        let json = serde_json::to_string(&ClientMessage::Login {
            username: "Scout".into(),
            version: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"login","username":"Scout"}"#);
    }

    #[test]
    fn auto_eat_is_flattened_into_tagged_object() {
        let json =
            serde_json::to_value(ClientMessage::ConfigureAutoEat(AutoEatOptions::default()))
                .unwrap();
        assert_eq!(json["type"], "configure_auto_eat");
        assert_eq!(json["priority"], "food_points");
        assert_eq!(json["start_at"], 14);
        assert!(json["banned_food"].as_array().unwrap().is_empty());
    }

    #[test]
    fn message_channel_defaults_to_chat() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"message","text":"hi","sender":"Alex"}"#).unwrap();
        match msg {
            ServerMessage::Message {
                channel, sender, ..
            } => {
                assert_eq!(channel, MessageChannel::Chat);
                assert_eq!(sender.as_deref(), Some("Alex"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn action_bar_channel_parses() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"type":"message","channel":"action_bar","text":"20/20❤"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ServerMessage::Message {
                channel: MessageChannel::ActionBar,
                sender: None,
                ..
            }
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_str::<ServerMessage>(r#"{"type":"teleport"}"#);
        assert!(result.is_err());
    }
}
