#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Malformed documents must be rejected, never panic.
        let _ = ragchat::sessions::persist::decode(s);
    }
});
