//! Process-wide search counters, enabled by the `PENUMBRA_PROFILE`
//! environment variable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// A snapshot of traversal profiling counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraversalProfileSnapshot {
    /// Forward steps taken.
    pub traverse_count: u64,
    /// Backtracking steps taken.
    pub revisit_count: u64,
    /// Total nanoseconds spent building candidate cursors.
    pub candidate_build_ns: u64,
    /// Number of candidate cursors built.
    pub candidate_build_count: u64,
    /// Candidates rejected by scope or loop checks.
    pub rejected_count: u64,
    /// Answers produced.
    pub answer_count: u64,
}

#[derive(Default)]
struct TraversalProfileCounters {
    traverse_count: AtomicU64,
    revisit_count: AtomicU64,
    candidate_build_ns: AtomicU64,
    candidate_build_count: AtomicU64,
    rejected_count: AtomicU64,
    answer_count: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<TraversalProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("PENUMBRA_PROFILE").is_some())
}

fn counters() -> Option<&'static TraversalProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(TraversalProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum TraversalProfileKind {
    Traverse,
    Revisit,
    Rejected,
    Answer,
}

pub(crate) fn record_profile_event(kind: TraversalProfileKind) {
    let Some(counters) = counters() else {
        return;
    };
    let counter = match kind {
        TraversalProfileKind::Traverse => &counters.traverse_count,
        TraversalProfileKind::Revisit => &counters.revisit_count,
        TraversalProfileKind::Rejected => &counters.rejected_count,
        TraversalProfileKind::Answer => &counters.answer_count,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_candidate_build(start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    counters.candidate_build_ns.fetch_add(nanos, Ordering::Relaxed);
    counters.candidate_build_count.fetch_add(1, Ordering::Relaxed);
}

/// Reads the counters, zeroing them when `reset` is set.
///
/// Returns `None` unless `PENUMBRA_PROFILE` was set when the process first
/// consulted it.
pub fn profile_snapshot(reset: bool) -> Option<TraversalProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(TraversalProfileSnapshot {
        traverse_count: load(&counters.traverse_count),
        revisit_count: load(&counters.revisit_count),
        candidate_build_ns: load(&counters.candidate_build_ns),
        candidate_build_count: load(&counters.candidate_build_count),
        rejected_count: load(&counters.rejected_count),
        answer_count: load(&counters.answer_count),
    })
}
