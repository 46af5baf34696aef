#![no_main]

use optbridge_core::path::{self, ObserverPattern, Path};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let _ = ObserverPattern::parse(input);
    let Ok(parsed) = Path::parse(input) else {
        assert!(path::rewrite(input).is_err());
        return;
    };
    // Both renderings parse back to the same segments.
    assert_eq!(Path::parse(&parsed.to_host()).ok(), Some(parsed.clone()));
    assert_eq!(Path::parse(&parsed.to_source()).ok(), Some(parsed.clone()));
    assert_eq!(path::rewrite(input).ok(), Some(parsed.to_host()));
});
