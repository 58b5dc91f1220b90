#![no_main]

use libfuzzer_sys::fuzz_target;
use mc_lookout::classify::classify;
use mc_lookout::protocol::ServerMessage;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = serde_json::from_slice::<ServerMessage>(data) else {
        return;
    };

    // Whatever the bridge sends, classification must not panic and must
    // never surface a blank sender.
    if let ServerMessage::Message {
        channel,
        text,
        sender,
    } = msg
    {
        let verdict = classify(channel, sender.as_deref(), &text, Some("Scout"));
        if let mc_lookout::classify::Classification::Chat { sender, .. } = verdict {
            assert!(!sender.trim().is_empty());
            assert_ne!(sender, "Scout");
        }
    }
});
