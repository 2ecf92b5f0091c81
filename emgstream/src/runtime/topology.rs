//! Core placement for the sampler and framer threads.
//!
//! The sampler is the latency-critical side: a preempted sampler misses its
//! read windows, a preempted framer only delays a frame. When at least two
//! cores are available the two threads get separate cores, with the sampler
//! kept off core 0 where most OS housekeeping lands.

use core_affinity::CoreId;

/// Chosen core per pipeline thread. `None` leaves the thread to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPlacement {
    pub sampler_core: Option<usize>,
    pub framer_core: Option<usize>,
    pub strategy: PlacementStrategy,
}

impl ThreadPlacement {
    #[must_use]
    pub const fn unpinned() -> Self {
        Self {
            sampler_core: None,
            framer_core: None,
            strategy: PlacementStrategy::NoPin,
        }
    }

    /// Picks cores from the ids the OS reports as usable.
    #[must_use]
    pub fn from_available(cores: &[usize]) -> Self {
        match cores {
            [framer, sampler, ..] => Self {
                sampler_core: Some(*sampler),
                framer_core: Some(*framer),
                strategy: PlacementStrategy::Dedicated,
            },
            _ => Self::unpinned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStrategy {
    /// Sampler and framer on separate cores.
    Dedicated,
    /// Fewer than two cores, or pinning disabled.
    NoPin,
    /// Cores given explicitly.
    Manual,
}

impl std::fmt::Display for PlacementStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dedicated => write!(f, "dedicated"),
            Self::NoPin => write!(f, "no-pin"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// How to place the pipeline threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CpuConfig {
    /// Detect usable cores and pick a placement.
    #[default]
    Auto,
    Manual {
        sampler_core: Option<usize>,
        framer_core: Option<usize>,
    },
    /// Never pin.
    Disabled,
}

impl CpuConfig {
    #[must_use]
    pub fn resolve(&self) -> ThreadPlacement {
        match self {
            Self::Auto => {
                let cores = core_affinity::get_core_ids()
                    .map(|ids| ids.into_iter().map(|id| id.id).collect::<Vec<_>>())
                    .unwrap_or_default();
                ThreadPlacement::from_available(&cores)
            }
            Self::Manual {
                sampler_core,
                framer_core,
            } => ThreadPlacement {
                sampler_core: *sampler_core,
                framer_core: *framer_core,
                strategy: PlacementStrategy::Manual,
            },
            Self::Disabled => ThreadPlacement::unpinned(),
        }
    }
}

/// Pins the current thread to `core_id`. Returns `false` if the OS refused.
pub fn pin_to_core(core_id: usize) -> bool {
    core_affinity::set_for_current(CoreId { id: core_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_cores_separate_the_threads() {
        let placement = ThreadPlacement::from_available(&[0, 1, 2, 3]);
        assert_eq!(placement.framer_core, Some(0));
        assert_eq!(placement.sampler_core, Some(1));
        assert_eq!(placement.strategy, PlacementStrategy::Dedicated);
    }

    #[test]
    fn single_core_stays_unpinned() {
        assert_eq!(ThreadPlacement::from_available(&[0]), ThreadPlacement::unpinned());
        assert_eq!(ThreadPlacement::from_available(&[]), ThreadPlacement::unpinned());
    }

    #[test]
    fn auto_never_reports_manual() {
        let placement = CpuConfig::Auto.resolve();
        assert_ne!(placement.strategy, PlacementStrategy::Manual);
        if let (Some(s), Some(f)) = (placement.sampler_core, placement.framer_core) {
            assert_ne!(s, f);
        }
    }

    #[test]
    fn manual_and_disabled_resolve_verbatim() {
        let manual = CpuConfig::Manual {
            sampler_core: Some(3),
            framer_core: None,
        }
        .resolve();
        assert_eq!((manual.sampler_core, manual.framer_core), (Some(3), None));
        assert_eq!(CpuConfig::Disabled.resolve(), ThreadPlacement::unpinned());
    }
}
