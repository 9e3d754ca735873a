#![no_main]

use chatgate::fuzz_api::parse_image_count;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let (n, cleaned) = parse_image_count(data, 1, 1..=4);
    assert!((1..=4).contains(&n));
    assert!(cleaned.len() <= data.len() + 1);
});
