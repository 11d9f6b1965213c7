#![no_main]
use libfuzzer_sys::fuzz_target;
use mqtt_stream::Topic;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(topic) = s.parse::<Topic>() {
            assert!(topic.is_valid());
            assert_eq!(topic.to_string(), s);
        }
    }
});
