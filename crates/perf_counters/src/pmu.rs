//! Counter-group lifecycle: open every canonical counter at
//! construction, start/stop them atomically around a measured region,
//! read back multiplexing-corrected values.

use log::warn;

use crate::set::CounterSet;

#[cfg(target_os = "linux")]
use crate::{
    catalog,
    group::{self, CounterGroup},
};

/// Owns the OS handles for the canonical counters.
///
/// Expensive to create; construct once and reuse around measured
/// regions. A single thread owns the instance and serializes
/// [`start`](Pmu::start)/[`stop`](Pmu::stop) pairs; counting is
/// inherited by children forked or spawned after `start`.
///
/// When the platform does not expose perf counters the instance is
/// inert: `start` returns `false` and `stop` returns `0.0` with every
/// counter zero.
pub struct Pmu {
    #[cfg(target_os = "linux")]
    active: Option<Active>,
}

#[cfg(target_os = "linux")]
struct Active {
    group: CounterGroup,
    /// Bit i set iff canonical counter i opened. The group holds
    /// exactly one fd per set bit, in the same order.
    valid: u16,
}

#[cfg(target_os = "linux")]
fn open_all() -> Option<Active> {
    if !group::supported() {
        warn!("this kernel does not expose perf counters; they will read zero");
        return None;
    }

    let mut group = CounterGroup::new();
    let mut valid = 0u16;
    for (idx, name) in CounterSet::NAMES.iter().enumerate() {
        let id = catalog::lookup(name);
        if idx == 0 {
            // The first canonical counter must be a hardware event:
            // adding a hardware event to a group holding only software
            // events is slow. Violating this is a catalog ordering bug.
            assert_eq!(
                id.kind,
                perf_event_open_sys::bindings::PERF_TYPE_HARDWARE,
                "leader counter {name} is not a hardware event"
            );
        }
        // Partial availability is expected: permissions and missing PMU
        // features knock out individual counters, not the whole set.
        match group.open_member(id) {
            Ok(()) => valid |= 1 << idx,
            Err(err) => warn!("counter {name} unavailable: {err}"),
        }
    }
    assert_eq!(group.len(), valid.count_ones() as usize);

    Some(Active { group, valid })
}

impl Pmu {
    /// Probes the platform and opens every canonical counter it can.
    ///
    /// Counters that fail to open are logged and read as zero; this
    /// never fails outright.
    pub fn new() -> Self {
        Pmu::probe()
    }

    #[cfg(target_os = "linux")]
    fn probe() -> Self {
        Pmu { active: open_all() }
    }

    #[cfg(not(target_os = "linux"))]
    fn probe() -> Self {
        warn!("perf counters are only available on Linux; they will read zero");
        Pmu {}
    }

    /// Starts every opened counter at the same instant.
    ///
    /// Returns `false` with no side effect when no counter is
    /// available.
    pub fn start(&mut self) -> bool {
        self.start_impl()
    }

    #[cfg(target_os = "linux")]
    fn start_impl(&mut self) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        if active.group.is_empty() {
            return false;
        }
        // Enable failure after a successful open is a defect in this
        // component, not an environmental condition.
        active
            .group
            .enable()
            .expect("failed to enable perf counter group");
        true
    }

    #[cfg(not(target_os = "linux"))]
    fn start_impl(&mut self) -> bool {
        false
    }

    /// Stops every counter, overwrites `set` with values extrapolated
    /// over the interval since [`start`](Pmu::start), and returns the
    /// minimum coverage across counters.
    ///
    /// Coverage is the fraction of the interval a counter was actually
    /// mapped onto a hardware register; it is below 1.0 when the kernel
    /// multiplexes more counters than there are physical registers.
    /// Values are scaled by `1 / coverage`, so the estimate of a
    /// counter with low coverage is correspondingly less trustworthy.
    /// Returns `0.0` when no counter is available; `set` is always
    /// fully overwritten.
    pub fn stop(&mut self, set: &mut CounterSet) -> f64 {
        // Zero first so callers get deterministic output regardless of
        // the set's prior contents.
        set.reset();
        self.stop_impl(set)
    }

    #[cfg(target_os = "linux")]
    fn stop_impl(&mut self, set: &mut CounterSet) -> f64 {
        let Some(active) = &self.active else {
            return 0.0;
        };
        if active.group.is_empty() {
            return 0.0;
        }

        // Stop the whole group before reading anything so every counter
        // reflects the identical elapsed interval.
        active.group.disable();

        let mut min_coverage = 1.0_f64;
        let mut idx = 0;
        let mut member = 0;
        set.for_each_mut(|mut slot, name| {
            let opened = (active.valid & (1 << idx)) != 0;
            idx += 1;
            if !opened {
                return;
            }

            let sample = match active.group.read_member(member) {
                Ok(sample) => sample,
                Err(err) => {
                    warn!("failed to read counter {name}: {err}");
                    member += 1;
                    return;
                }
            };
            member += 1;

            assert!(
                sample.time_running <= sample.time_enabled,
                "counter {name} ran longer than it was enabled"
            );
            if sample.time_running == 0 {
                // Never scheduled onto hardware; contributes nothing.
                return;
            }

            let coverage = sample.time_running as f64 / sample.time_enabled as f64;
            assert!(0.0 < coverage && coverage <= 1.0);
            min_coverage = min_coverage.min(coverage);
            // Assumes uniform event density over the interval.
            slot.set(sample.value as f64 / coverage);
        });

        min_coverage
    }

    #[cfg(not(target_os = "linux"))]
    fn stop_impl(&mut self, _set: &mut CounterSet) -> f64 {
        0.0
    }
}

impl Default for Pmu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct_then_drop_without_measuring() {
        let pmu = Pmu::new();
        drop(pmu);
    }

    #[test]
    fn stop_without_start_reads_zero() {
        let mut pmu = Pmu::new();
        let mut set = CounterSet::default();
        set.instruction = 123.0;
        set.page_fault = 7.0;

        // The group was never enabled, so no counter accumulated
        // running time and every slot stays zero.
        let coverage = pmu.stop(&mut set);
        assert_eq!(set, CounterSet::default());
        assert!(coverage == 0.0 || coverage == 1.0);
    }

    #[test]
    fn start_stop_contract() {
        let mut pmu = Pmu::new();
        let mut set = CounterSet::default();
        set.branch = 99.0;

        if pmu.start() {
            let coverage = pmu.stop(&mut set);
            assert!(coverage > 0.0 && coverage <= 1.0);
        } else {
            // Inert instance: exact zero coverage, all-zero output.
            assert_eq!(pmu.stop(&mut set), 0.0);
            assert_eq!(set, CounterSet::default());
        }
    }
}
