//! Debug assertion macros for dispatcher invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]` via
//! `debug_assert!`), so there is zero overhead in release builds.

// =============================================================================
// INV-BACK-01: Capped Backoff
// =============================================================================

/// Assert that a backoff delay never exceeds its configured limit.
///
/// Used in: `Backoff::next_delay()`
macro_rules! debug_assert_backoff_capped {
    ($delay:expr, $limit:expr) => {
        debug_assert!(
            $delay <= $limit,
            "INV-BACK-01 violated: delay {:?} exceeds limit {:?}",
            $delay,
            $limit
        )
    };
}

// =============================================================================
// INV-PACE-01: One Active Pacer
// =============================================================================

/// Assert that the pacer being replaced has fully stopped before its
/// successor starts.
///
/// **Invariant**: `rebuild → old.state() == Stopped → Pacer::start(new)`
///
/// Used in: the scheduler loop on every schedule rebuild
#[cfg(debug_assertions)]
macro_rules! debug_assert_pacer_stopped {
    ($state:expr) => {
        debug_assert!(
            $state == $crate::pacer::PacerState::Stopped,
            "INV-PACE-01 violated: replacing a pacer in state {:?}",
            $state
        )
    };
}

// =============================================================================
// INV-PACE-02: Sequential Offers
// =============================================================================

/// Assert that a pacer never has more than one offer outstanding.
///
/// Used in: the pacer task before publishing an offer
#[cfg(debug_assertions)]
macro_rules! debug_assert_single_offer {
    ($outstanding:expr) => {
        debug_assert!(
            $outstanding <= 1,
            "INV-PACE-02 violated: {} offers outstanding",
            $outstanding
        )
    };
}

pub(crate) use debug_assert_backoff_capped;
#[cfg(debug_assertions)]
pub(crate) use debug_assert_pacer_stopped;
#[cfg(debug_assertions)]
pub(crate) use debug_assert_single_offer;
