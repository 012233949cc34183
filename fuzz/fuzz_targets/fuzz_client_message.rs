#![no_main]

use chat_sync_client::protocol::ClientMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(message) = serde_json::from_str::<ClientMessage>(s) {
            let encoded = serde_json::to_string(&message).expect("re-encode");
            let again: ClientMessage = serde_json::from_str(&encoded).expect("re-decode");
            assert_eq!(again, message);
        }
    }
});
