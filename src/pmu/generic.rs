//! The kernel's generic hardware, software and cache events.

use crate::pmu::attr::{PERF_TYPE_HARDWARE, PERF_TYPE_HW_CACHE, PERF_TYPE_SOFTWARE};
use crate::pmu::Attribute;
use lazy_static::lazy_static;
use std::collections::HashMap;

const CACHE_L1D: u64 = 0;
const CACHE_L1I: u64 = 1;
const CACHE_LL: u64 = 2;
const CACHE_DTLB: u64 = 3;
const CACHE_ITLB: u64 = 4;
const CACHE_BPU: u64 = 5;

const OP_READ: u64 = 0;
const OP_WRITE: u64 = 1;
const OP_PREFETCH: u64 = 2;

const RESULT_ACCESS: u64 = 0;
const RESULT_MISS: u64 = 1;

#[inline]
const fn cache(id: u64, op: u64, result: u64) -> u64 {
    id | (op << 8) | (result << 16)
}

lazy_static! {
    static ref GENERIC_EVENTS: HashMap<&'static str, (u32, u64)> = {
        let mut m = HashMap::new();
        for &(name, config) in [
            ("cpu-cycles", 0),
            ("cycles", 0),
            ("instructions", 1),
            ("cache-references", 2),
            ("cache-misses", 3),
            ("branch-instructions", 4),
            ("branches", 4),
            ("branch-misses", 5),
            ("bus-cycles", 6),
            ("stalled-cycles-frontend", 7),
            ("stalled-cycles-backend", 8),
            ("ref-cycles", 9),
        ]
        .iter()
        {
            m.insert(name, (PERF_TYPE_HARDWARE, config));
        }
        for &(name, config) in [
            ("cpu-clock", 0),
            ("task-clock", 1),
            ("page-faults", 2),
            ("faults", 2),
            ("context-switches", 3),
            ("cs", 3),
            ("cpu-migrations", 4),
            ("migrations", 4),
            ("minor-faults", 5),
            ("major-faults", 6),
            ("alignment-faults", 7),
            ("emulation-faults", 8),
        ]
        .iter()
        {
            m.insert(name, (PERF_TYPE_SOFTWARE, config));
        }
        for &(name, config) in [
            ("L1-dcache-loads", cache(CACHE_L1D, OP_READ, RESULT_ACCESS)),
            ("L1-dcache-load-misses", cache(CACHE_L1D, OP_READ, RESULT_MISS)),
            ("L1-dcache-stores", cache(CACHE_L1D, OP_WRITE, RESULT_ACCESS)),
            ("L1-dcache-store-misses", cache(CACHE_L1D, OP_WRITE, RESULT_MISS)),
            ("L1-dcache-prefetches", cache(CACHE_L1D, OP_PREFETCH, RESULT_ACCESS)),
            ("L1-dcache-prefetch-misses", cache(CACHE_L1D, OP_PREFETCH, RESULT_MISS)),
            ("L1-icache-loads", cache(CACHE_L1I, OP_READ, RESULT_ACCESS)),
            ("L1-icache-load-misses", cache(CACHE_L1I, OP_READ, RESULT_MISS)),
            ("L1-icache-prefetches", cache(CACHE_L1I, OP_PREFETCH, RESULT_ACCESS)),
            ("L1-icache-prefetch-misses", cache(CACHE_L1I, OP_PREFETCH, RESULT_MISS)),
            ("LLC-loads", cache(CACHE_LL, OP_READ, RESULT_ACCESS)),
            ("LLC-load-misses", cache(CACHE_LL, OP_READ, RESULT_MISS)),
            ("LLC-stores", cache(CACHE_LL, OP_WRITE, RESULT_ACCESS)),
            ("LLC-store-misses", cache(CACHE_LL, OP_WRITE, RESULT_MISS)),
            ("LLC-prefetches", cache(CACHE_LL, OP_PREFETCH, RESULT_ACCESS)),
            ("LLC-prefetch-misses", cache(CACHE_LL, OP_PREFETCH, RESULT_MISS)),
            ("dTLB-loads", cache(CACHE_DTLB, OP_READ, RESULT_ACCESS)),
            ("dTLB-load-misses", cache(CACHE_DTLB, OP_READ, RESULT_MISS)),
            ("dTLB-stores", cache(CACHE_DTLB, OP_WRITE, RESULT_ACCESS)),
            ("dTLB-store-misses", cache(CACHE_DTLB, OP_WRITE, RESULT_MISS)),
            ("dTLB-prefetches", cache(CACHE_DTLB, OP_PREFETCH, RESULT_ACCESS)),
            ("dTLB-prefetch-misses", cache(CACHE_DTLB, OP_PREFETCH, RESULT_MISS)),
            ("iTLB-loads", cache(CACHE_ITLB, OP_READ, RESULT_ACCESS)),
            ("iTLB-load-misses", cache(CACHE_ITLB, OP_READ, RESULT_MISS)),
            ("branch-loads", cache(CACHE_BPU, OP_READ, RESULT_ACCESS)),
            ("branch-load-misses", cache(CACHE_BPU, OP_READ, RESULT_MISS)),
        ]
        .iter()
        {
            m.insert(name, (PERF_TYPE_HW_CACHE, config));
        }
        m
    };
}

/// Attribute of a generic kernel event, e.g. `cycles` or `LLC-load-misses`.
pub fn generic_event(name: &str) -> Option<Attribute> {
    GENERIC_EVENTS.get(name).map(|&(pmu_type, config)| Attribute {
        pmu_type,
        config,
        ..Default::default()
    })
}

/// Names of all generic kernel events, sorted.
pub fn generic_event_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = GENERIC_EVENTS.keys().cloned().collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_events() {
        let attr = generic_event("instructions").unwrap();
        assert_eq!((attr.pmu_type, attr.config), (PERF_TYPE_HARDWARE, 1));
        let attr = generic_event("task-clock").unwrap();
        assert_eq!((attr.pmu_type, attr.config), (PERF_TYPE_SOFTWARE, 1));
        let attr = generic_event("L1-dcache-load-misses").unwrap();
        assert_eq!((attr.pmu_type, attr.config), (PERF_TYPE_HW_CACHE, 0x10000));
        let attr = generic_event("LLC-prefetches").unwrap();
        assert_eq!(attr.config, 0x0202);
        assert!(generic_event("l1-dcache-loads").is_none());
        assert!(generic_event_names().contains(&"cache-misses"));
    }
}
