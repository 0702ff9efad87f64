/// Mutable access to one slot of a [`CounterSet`].
///
/// The two fastest-growing counters are stored as `f64`, the rest as
/// `f32`; `Slot` lets a caller write either kind without per-field code.
pub enum Slot<'a> {
    /// High-dynamic-range slot (cycle and instruction counts).
    Wide(&'a mut f64),
    /// Lower-precision slot for the remaining counters.
    Narrow(&'a mut f32),
}

impl Slot<'_> {
    /// Stores `value`, narrowing to `f32` where the slot requires it.
    pub fn set(&mut self, value: f64) {
        match self {
            Slot::Wide(v) => **v = value,
            Slot::Narrow(v) => **v = value as f32,
        }
    }

    /// Returns the slot value widened to `f64`.
    pub fn get(&self) -> f64 {
        match self {
            Slot::Wide(v) => **v,
            Slot::Narrow(v) => f64::from(**v),
        }
    }
}

/// Extrapolated values of the canonical performance counters.
///
/// Values are floating point because multiplexed counters are scaled by
/// `1 / coverage`, and every field is a sum rather than a ratio, so a
/// harness can add or subtract whole sets field-wise (e.g. to diff
/// nested measurement regions).
///
/// The field order is fixed: it is the order counters are opened in,
/// the order they are read back in, and the order [`CounterSet::NAMES`]
/// lists them in. `page_fault` is last because it is the only software
/// event and the group leader must be a hardware event.
///
/// # Examples
///
/// ```
/// use perf_counters::CounterSet;
///
/// let mut set = CounterSet::default();
/// set.instruction = 1_000.0;
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CounterSet {
    /// Reference CPU cycles, unaffected by frequency scaling.
    pub ref_cycle: f64,
    /// Retired instructions.
    pub instruction: f64,
    /// Retired branch instructions.
    pub branch: f32,
    /// Mispredicted branches.
    pub branch_mispred: f32,
    /// Cycles in which the frontend was stalled.
    pub frontend_stall: f32,
    /// Cycles in which the backend was stalled.
    pub backend_stall: f32,
    /// L3 (last-level) cache load accesses.
    pub l3_load: f32,
    /// L3 cache store accesses.
    pub l3_store: f32,
    /// L3 cache load misses.
    pub l3_load_miss: f32,
    /// L3 cache store misses.
    pub l3_store_miss: f32,
    /// Page faults.
    pub page_fault: f32,
}

impl CounterSet {
    /// Number of canonical counters.
    pub const NUM: usize = 11;

    /// Canonical counter names, in the one order shared by the open,
    /// read, and print paths.
    pub const NAMES: [&'static str; Self::NUM] = [
        "ref_cycle",
        "instruction",
        "branch",
        "branch_mispred",
        "frontend_stall",
        "backend_stall",
        "l3_load",
        "l3_store",
        "l3_load_miss",
        "l3_store_miss",
        "page_fault",
    ];

    /// Visits every slot mutably, in canonical order.
    ///
    /// This is the single source of truth for the field ordering; every
    /// other enumeration ([`CounterSet::for_each`], [`CounterSet::NAMES`])
    /// must agree with it.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(Slot<'_>, &'static str)) {
        f(Slot::Wide(&mut self.ref_cycle), "ref_cycle");
        f(Slot::Wide(&mut self.instruction), "instruction");
        f(Slot::Narrow(&mut self.branch), "branch");
        f(Slot::Narrow(&mut self.branch_mispred), "branch_mispred");
        f(Slot::Narrow(&mut self.frontend_stall), "frontend_stall");
        f(Slot::Narrow(&mut self.backend_stall), "backend_stall");
        f(Slot::Narrow(&mut self.l3_load), "l3_load");
        f(Slot::Narrow(&mut self.l3_store), "l3_store");
        f(Slot::Narrow(&mut self.l3_load_miss), "l3_load_miss");
        f(Slot::Narrow(&mut self.l3_store_miss), "l3_store_miss");
        // Must stay last, see NAMES.
        f(Slot::Narrow(&mut self.page_fault), "page_fault");
    }

    /// Visits every value (widened to `f64`), in canonical order.
    pub fn for_each(&self, mut f: impl FnMut(f64, &'static str)) {
        let mut copy = *self;
        copy.for_each_mut(|slot, name| f(slot.get(), name));
    }

    /// Zeroes every slot.
    pub fn reset(&mut self) {
        self.for_each_mut(|mut slot, _| slot.set(0.0));
    }
}

impl std::fmt::Display for CounterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::with_capacity(Self::NUM);
        self.for_each(|value, name| parts.push(format!("{name}={value:.0}")));
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirty_set() -> CounterSet {
        let mut set = CounterSet::default();
        let mut next = 1.0;
        set.for_each_mut(|mut slot, _| {
            slot.set(next);
            next += 1.0;
        });
        set
    }

    #[test]
    fn enumeration_matches_names() {
        let mut names = Vec::new();
        CounterSet::default().for_each(|_, name| names.push(name));
        assert_eq!(names, CounterSet::NAMES);
        assert_eq!(names.len(), CounterSet::NUM);
    }

    #[test]
    fn wide_slots_are_cycles_and_instructions() {
        let mut wide = Vec::new();
        CounterSet::default().for_each_mut(|slot, name| {
            if matches!(slot, Slot::Wide(_)) {
                wide.push(name);
            }
        });
        assert_eq!(wide, ["ref_cycle", "instruction"]);
    }

    #[test]
    fn page_fault_is_last() {
        assert_eq!(CounterSet::NAMES[CounterSet::NUM - 1], "page_fault");
    }

    #[test]
    fn reset_zeroes_every_slot() {
        let mut set = dirty_set();
        assert_ne!(set, CounterSet::default());

        set.reset();
        assert_eq!(set, CounterSet::default());
    }

    #[test]
    fn slot_round_trips_values() {
        let mut set = CounterSet::default();
        set.for_each_mut(|mut slot, _| {
            slot.set(42.0);
            assert_eq!(slot.get(), 42.0);
        });
        assert_eq!(set.ref_cycle, 42.0);
        assert_eq!(set.page_fault, 42.0);
    }

    #[test]
    fn display_lists_every_counter() {
        let rendered = dirty_set().to_string();
        for name in CounterSet::NAMES {
            assert!(rendered.contains(name), "missing {name} in {rendered}");
        }
        assert!(rendered.contains("ref_cycle=1"));
        assert!(rendered.contains("page_fault=11"));
    }
}
