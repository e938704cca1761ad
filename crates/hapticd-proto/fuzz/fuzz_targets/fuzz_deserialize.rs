#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding client text must never panic, and every decoded message
    // must encode again at the current schema version.
    if let Ok(s) = std::str::from_utf8(data) {
        let messages: Vec<_> = hapticd_proto::deserialize(s)
            .into_iter()
            .filter_map(Result::ok)
            .collect();
        let _ = hapticd_proto::serialize(&messages, hapticd_proto::CURRENT_SCHEMA_VERSION);
    }
});
