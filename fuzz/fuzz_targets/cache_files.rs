#![no_main]

use libfuzzer_sys::fuzz_target;
use nightwatch_core::ElementKind;
use nightwatch_pbf::OffsetIndex;
use nightwatch_tracker::RelationChangesTracker;

fuzz_target!(|data: &[u8]| {
    // Persisted files may be truncated or garbage; counts must never drive
    // allocations the input cannot back.
    if let Ok(index) = OffsetIndex::from_cache_bytes("fuzz.pbf", data) {
        assert_eq!(index.to_cache_bytes(), data);
        let _ = index.lookup(ElementKind::Node, 0);
        let _ = index.bucket_offsets([i64::MIN, 0, i64::MAX], ElementKind::Way);
    }

    if let Ok(tracker) = RelationChangesTracker::from_bytes(data) {
        let _ = tracker.to_bytes();
    }
});
