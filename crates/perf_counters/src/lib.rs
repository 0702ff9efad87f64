//! # perf_counters
//!
//! Best-effort CPU performance counters around a measured region of
//! code, corrected for kernel counter multiplexing.
//!
//! The canonical counters (cycles, instructions, branches, stalls, L3
//! cache traffic, page faults) are opened as one perf scheduling group
//! so they start and stop at the same instant. When more counters are
//! requested than the CPU has physical registers, the kernel
//! time-shares them; each counter reports how long it actually ran, and
//! values are extrapolated by `1 / coverage`. The minimum coverage
//! across counters is returned as a trust signal.
//!
//! ```no_run
//! use perf_counters::{CounterSet, Pmu};
//!
//! let mut pmu = Pmu::new();
//! let mut counters = CounterSet::default();
//!
//! if pmu.start() {
//!     workload();
//!     let coverage = pmu.stop(&mut counters);
//!     println!("{counters} (coverage {coverage:.2})");
//! }
//! # fn workload() {}
//! ```
//!
//! On platforms or kernels without perf counters the same API is
//! available; `start` returns `false` and every counter reads zero.

mod catalog;
mod group;
mod pmu;
mod set;

pub use pmu::Pmu;
pub use set::{CounterSet, Slot};
