#![cfg(target_os = "linux")]

//! Maps canonical counter names to `perf_event_open` event ids.

use perf_event_open_sys as sys;

/// Identifies one perf event: a `PERF_TYPE_*` class plus its config code.
///
/// Produced only by [`lookup`]; never constructed ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CounterId {
    pub config: u64,
    pub kind: u32,
}

/// Returns the perf event id for a canonical counter name.
///
/// Total over [`CounterSet::NAMES`](crate::CounterSet::NAMES); callers
/// only ever derive names from that enumeration, so any other input is
/// a bug and panics.
pub(crate) fn lookup(name: &str) -> CounterId {
    let hw = |config: u32| CounterId {
        config: u64::from(config),
        kind: sys::bindings::PERF_TYPE_HARDWARE,
    };
    // Cache event ids pack the cache level, the operation, and the
    // wanted result into one config word.
    let cache = |op: u32, result: u32| CounterId {
        config: u64::from(sys::bindings::PERF_COUNT_HW_CACHE_LL)
            | u64::from(op) << 8
            | u64::from(result) << 16,
        kind: sys::bindings::PERF_TYPE_HW_CACHE,
    };

    use sys::bindings::{
        PERF_COUNT_HW_CACHE_OP_READ as OP_READ, PERF_COUNT_HW_CACHE_OP_WRITE as OP_WRITE,
        PERF_COUNT_HW_CACHE_RESULT_ACCESS as RESULT_ACCESS,
        PERF_COUNT_HW_CACHE_RESULT_MISS as RESULT_MISS,
    };

    match name {
        "ref_cycle" => hw(sys::bindings::PERF_COUNT_HW_REF_CPU_CYCLES),
        "instruction" => hw(sys::bindings::PERF_COUNT_HW_INSTRUCTIONS),
        "branch" => hw(sys::bindings::PERF_COUNT_HW_BRANCH_INSTRUCTIONS),
        "branch_mispred" => hw(sys::bindings::PERF_COUNT_HW_BRANCH_MISSES),
        "frontend_stall" => hw(sys::bindings::PERF_COUNT_HW_STALLED_CYCLES_FRONTEND),
        "backend_stall" => hw(sys::bindings::PERF_COUNT_HW_STALLED_CYCLES_BACKEND),
        "l3_load" => cache(OP_READ, RESULT_ACCESS),
        "l3_store" => cache(OP_WRITE, RESULT_ACCESS),
        "l3_load_miss" => cache(OP_READ, RESULT_MISS),
        "l3_store_miss" => cache(OP_WRITE, RESULT_MISS),
        "page_fault" => CounterId {
            config: u64::from(sys::bindings::PERF_COUNT_SW_PAGE_FAULTS),
            kind: sys::bindings::PERF_TYPE_SOFTWARE,
        },
        _ => panic!("no perf event id for counter {name:?}"),
    }
}
