//! # Core identity and migration pinning
//!
//! Code that keeps per-core state (free lists, caches) must know which core it
//! runs on, and that answer must stay true for the duration of the access.
//! This crate provides the collaborator interface for both halves:
//!
//! - [`CpuOps`]: asks the platform how many cores exist, which one is
//!   executing, and to suspend/resume task migration.
//! - [`PinnedCore`]: an RAII guard that disables migration on construction,
//!   snapshots the core id, and re-enables migration on drop — on every exit
//!   path, including early returns and unwinding.
//!
//! On bare metal, disabling migration typically means masking interrupts (the
//! scheduler cannot move a task that cannot be preempted). [`SingleCore`]
//! serves uniprocessor bring-up; hosts and tests can substitute their own
//! [`CpuOps`] (see `HostCpu` under the `std` feature).

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]

/// Platform hooks for core identity.
///
/// `disable_migration` / `enable_migration` must nest: identity is stable from
/// the first disable to the matching last enable.
pub trait CpuOps: Sync {
    /// Number of cores the platform schedules on.
    fn core_count(&self) -> usize;

    /// Id of the executing core, in `0..core_count()`.
    ///
    /// Only meaningful while migration is disabled; a task may move between
    /// two un-pinned calls.
    fn current_core(&self) -> usize;

    /// Suspend migration of the current task. Nestable.
    fn disable_migration(&self);

    /// Undo one `disable_migration`.
    fn enable_migration(&self);
}

impl<C: CpuOps + ?Sized> CpuOps for &C {
    fn core_count(&self) -> usize {
        (**self).core_count()
    }

    fn current_core(&self) -> usize {
        (**self).current_core()
    }

    fn disable_migration(&self) {
        (**self).disable_migration();
    }

    fn enable_migration(&self) {
        (**self).enable_migration();
    }
}

/// Scoped migration pin.
///
/// While a `PinnedCore` is alive the current task stays on the core whose id
/// [`core`](Self::core) reports. Guards may nest freely.
#[must_use = "dropping the guard immediately re-enables migration"]
pub struct PinnedCore<'a, C: CpuOps + ?Sized> {
    cpu: &'a C,
    core: usize,
}

impl<'a, C: CpuOps + ?Sized> PinnedCore<'a, C> {
    pub fn new(cpu: &'a C) -> Self {
        cpu.disable_migration();
        let core = cpu.current_core();
        Self { cpu, core }
    }

    /// The core this task is pinned to.
    #[inline]
    pub const fn core(&self) -> usize {
        self.core
    }
}

impl<C: CpuOps + ?Sized> Drop for PinnedCore<'_, C> {
    fn drop(&mut self) {
        self.cpu.enable_migration();
    }
}

/// Trivial uniprocessor implementation: one core, nothing ever migrates.
pub struct SingleCore;

impl CpuOps for SingleCore {
    fn core_count(&self) -> usize {
        1
    }

    fn current_core(&self) -> usize {
        0
    }

    fn disable_migration(&self) {}

    fn enable_migration(&self) {}
}

#[cfg(any(test, doctest, feature = "std"))]
mod host {
    use super::CpuOps;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    std::thread_local! {
        static THREAD_CORE: Cell<usize> = const { Cell::new(0) };
        static PIN_DEPTH: Cell<usize> = const { Cell::new(0) };
    }

    /// Host-side [`CpuOps`] for tests: each thread plays the part of a core.
    ///
    /// A thread's core id defaults to `0`; [`assign_current_thread`]
    /// reassigns it. Migration never actually happens on the host, so the
    /// disable/enable hooks only maintain the nesting depth, which
    /// [`pin_depth`] exposes for assertions.
    ///
    /// [`assign_current_thread`]: Self::assign_current_thread
    /// [`pin_depth`]: Self::pin_depth
    pub struct HostCpu {
        cores: usize,
        max_depth_seen: AtomicUsize,
    }

    impl HostCpu {
        #[must_use]
        pub const fn new(cores: usize) -> Self {
            Self {
                cores,
                max_depth_seen: AtomicUsize::new(0),
            }
        }

        /// Make the calling thread act as `core`.
        ///
        /// # Panics
        /// If `core` is out of range.
        pub fn assign_current_thread(&self, core: usize) {
            assert!(core < self.cores, "core id {core} out of range");
            THREAD_CORE.with(|c| c.set(core));
        }

        /// Current nesting depth of migration pins on this thread.
        pub fn pin_depth(&self) -> usize {
            PIN_DEPTH.with(Cell::get)
        }

        /// Deepest nesting observed anywhere (sanity checks in tests).
        pub fn max_pin_depth(&self) -> usize {
            self.max_depth_seen.load(Ordering::Relaxed)
        }
    }

    impl CpuOps for HostCpu {
        fn core_count(&self) -> usize {
            self.cores
        }

        fn current_core(&self) -> usize {
            THREAD_CORE.with(Cell::get)
        }

        fn disable_migration(&self) {
            let depth = PIN_DEPTH.with(|d| {
                let depth = d.get() + 1;
                d.set(depth);
                depth
            });
            self.max_depth_seen.fetch_max(depth, Ordering::Relaxed);
        }

        fn enable_migration(&self) {
            PIN_DEPTH.with(|d| {
                let depth = d.get();
                assert!(depth > 0, "unbalanced enable_migration");
                d.set(depth - 1);
            });
        }
    }
}

#[cfg(any(test, doctest, feature = "std"))]
pub use host::HostCpu;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_guard_brackets_migration() {
        let cpu = HostCpu::new(4);
        cpu.assign_current_thread(2);

        assert_eq!(cpu.pin_depth(), 0);
        {
            let pin = PinnedCore::new(&cpu);
            assert_eq!(pin.core(), 2);
            assert_eq!(cpu.pin_depth(), 1);
        }
        assert_eq!(cpu.pin_depth(), 0);
    }

    #[test]
    fn pins_nest() {
        let cpu = HostCpu::new(2);

        let outer = PinnedCore::new(&cpu);
        {
            let inner = PinnedCore::new(&cpu);
            assert_eq!(inner.core(), outer.core());
            assert_eq!(cpu.pin_depth(), 2);
        }
        assert_eq!(cpu.pin_depth(), 1);
        drop(outer);
        assert_eq!(cpu.pin_depth(), 0);
        assert_eq!(cpu.max_pin_depth(), 2);
    }

    #[test]
    fn single_core_is_always_core_zero() {
        let cpu = SingleCore;
        let pin = PinnedCore::new(&cpu);
        assert_eq!(pin.core(), 0);
        assert_eq!(cpu.core_count(), 1);
    }
}
