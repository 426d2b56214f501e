//! Process-wide simulation counters.
//! Cheap relaxed atomics; read them through [`snapshot`].
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static EVENTS_DISPATCHED: AtomicU64 = AtomicU64::new(0);
static DISPATCH_OVERFLOWS: AtomicU64 = AtomicU64::new(0);
static SAVES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static SAVES_FAILED: AtomicU64 = AtomicU64::new(0);
static LOADS_COMPLETED: AtomicU64 = AtomicU64::new(0);
static LOADS_FAILED: AtomicU64 = AtomicU64::new(0);
static SAVE_LATENCY_SUM_MS: AtomicU64 = AtomicU64::new(0);
static SAVE_LATENCY_COUNT: AtomicU64 = AtomicU64::new(0);

pub fn add_events_dispatched(count: u64) {
    EVENTS_DISPATCHED.fetch_add(count, Ordering::Relaxed);
}

pub fn inc_dispatch_overflow() {
    DISPATCH_OVERFLOWS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_saves_written() {
    SAVES_WRITTEN.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_saves_failed() {
    SAVES_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_loads_completed() {
    LOADS_COMPLETED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_loads_failed() {
    LOADS_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub fn observe_save_latency(started_at: Instant) {
    let ms = started_at.elapsed().as_millis() as u64;
    SAVE_LATENCY_SUM_MS.fetch_add(ms, Ordering::Relaxed);
    SAVE_LATENCY_COUNT.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub events_dispatched: u64,
    pub dispatch_overflows: u64,
    pub saves_written: u64,
    pub saves_failed: u64,
    pub loads_completed: u64,
    pub loads_failed: u64,
    pub save_latency_avg_ms: Option<u64>,
}

pub fn snapshot() -> Snapshot {
    let sum = SAVE_LATENCY_SUM_MS.load(Ordering::Relaxed);
    let count = SAVE_LATENCY_COUNT.load(Ordering::Relaxed);
    Snapshot {
        events_dispatched: EVENTS_DISPATCHED.load(Ordering::Relaxed),
        dispatch_overflows: DISPATCH_OVERFLOWS.load(Ordering::Relaxed),
        saves_written: SAVES_WRITTEN.load(Ordering::Relaxed),
        saves_failed: SAVES_FAILED.load(Ordering::Relaxed),
        loads_completed: LOADS_COMPLETED.load(Ordering::Relaxed),
        loads_failed: LOADS_FAILED.load(Ordering::Relaxed),
        save_latency_avg_ms: if count > 0 { Some(sum / count) } else { None },
    }
}
