#![no_main]

use ftui_observe::index_map::{IndexEntry, IndexMap};
use ftui_observe::Reconciler;
use libfuzzer_sys::fuzz_target;

// Bytes become a shuffled survivor order plus created slots: each byte
// either places the next unused prior index (picked by value) or a created
// entry.
fuzz_target!(|data: &[u8]| {
    let Some((&prior_len, rest)) = data.split_first() else {
        return;
    };
    let prior_len = usize::from(prior_len % 64);
    let mut unused: Vec<usize> = (0..prior_len).collect();
    let mut entries = Vec::new();
    for &byte in rest.iter().take(128) {
        if byte & 1 == 0 || unused.is_empty() {
            entries.push(IndexEntry::Created);
        } else {
            let pick = usize::from(byte >> 1) % unused.len();
            entries.push(IndexEntry::Prior(unused.remove(pick)));
        }
    }
    let map = IndexMap::from_parts(entries, unused);

    let mut reconciler = Reconciler::new();
    let plan = reconciler.plan(&map);
    assert_eq!(
        plan.stable.len() + plan.moves.len() + plan.inserts.len(),
        map.len()
    );

    let units: Vec<usize> = (0..prior_len).collect();
    let mut released = 0usize;
    let next = reconciler.apply(units, &map, |_| usize::MAX, |_| released += 1);
    assert_eq!(released, map.deleted_indices().len());
    for (position, entry) in map.entries().iter().enumerate() {
        match entry {
            IndexEntry::Prior(index) => assert_eq!(next[position], *index),
            IndexEntry::Created => assert_eq!(next[position], usize::MAX),
        }
    }
});
