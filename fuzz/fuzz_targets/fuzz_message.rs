#![no_main]

use libfuzzer_sys::fuzz_target;
use multiuser_server::Message;

fuzz_target!(|data: &[u8]| {
    let _ = Message::decode(data);
});
