#![no_main]

use chat_sync_client::protocol::ServerMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Raw-byte path, including serde_json's UTF-8 validation.
    let _ = serde_json::from_slice::<ServerMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(message) = serde_json::from_str::<ServerMessage>(s) {
            // Anything we accept must re-encode under the same event name.
            let encoded = serde_json::to_string(&message).expect("re-encode");
            let again: ServerMessage = serde_json::from_str(&encoded).expect("re-decode");
            assert_eq!(again.event_name(), message.event_name());
        }
    }
});
