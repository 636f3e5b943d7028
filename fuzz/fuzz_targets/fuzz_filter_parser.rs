#![no_main]

use adrest::directory::filter::parse_filter;
use adrest::directory::split_rdn;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Malformed filters must come back as errors, never panics
        let _ = parse_filter(input);
        let _ = split_rdn(input);
    }
});
