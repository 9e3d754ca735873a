#![no_main]

use chatgate::fuzz_api::parse_verdict;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let verdict = parse_verdict(data);
    // only blank text may come back without a verdict
    assert_eq!(verdict.is_none(), data.trim().is_empty());
});
