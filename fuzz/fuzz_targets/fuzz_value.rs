#![no_main]

use libfuzzer_sys::fuzz_target;
use multiuser_server::Value;

fuzz_target!(|data: &[u8]| {
    // Hostile lengths and counts must fail cleanly, never panic or over-allocate
    if let Ok((value, used)) = Value::decode(data, 0) {
        assert!(used <= data.len());
        let _ = value.encode();
    }
});
