#![no_main]

use std::collections::HashSet;

use libfuzzer_sys::fuzz_target;
use nightwatch_core::{ElementFilter, ElementKind};
use nightwatch_pbf::{parse_relations, sniff_first_element, IndexedTagFilters};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a decoded PrimitiveBlock. Both walkers must return an
    // error for anything malformed: overlong varints, lengths that escape the
    // enclosing frame, string indices past the table, mismatched member arrays.
    let _ = sniff_first_element(data);
    let _ = parse_relations(data, None, None);

    let wanted: HashSet<i64> = [0, 1, 2, 100].into_iter().collect();
    let _ = parse_relations(data, Some(&wanted), None);

    let filters = IndexedTagFilters::for_kind(
        &[ElementFilter::new(ElementKind::Relation)
            .with_key("a")
            .with_values("b", ["c", ""])],
        ElementKind::Relation,
    );
    let _ = parse_relations(data, None, filters.as_ref());
});
