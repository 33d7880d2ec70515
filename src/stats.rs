use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the ingest, decode and output threads
#[derive(Debug, Default)]
pub struct Stats {
    pub frames_received: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_applied: AtomicU64,
    pub frames_held: AtomicU64,
    pub frames_malformed: AtomicU64,
    pub ticks: AtomicU64,
    pub frames_sent: AtomicU64,
    pub reopen_attempts: AtomicU64,
}

/// Point-in-time copy of [`Stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSample {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub frames_applied: u64,
    pub frames_held: u64,
    pub frames_malformed: u64,
    pub ticks: u64,
    pub frames_sent: u64,
    pub reopen_attempts: u64,
}

impl Stats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample(&self) -> StatsSample {
        StatsSample {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_applied: self.frames_applied.load(Ordering::Relaxed),
            frames_held: self.frames_held.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            reopen_attempts: self.reopen_attempts.load(Ordering::Relaxed),
        }
    }
}

impl StatsSample {
    /// Counter increase since `earlier`
    pub fn since(&self, earlier: &StatsSample) -> StatsSample {
        StatsSample {
            frames_received: self.frames_received - earlier.frames_received,
            frames_dropped: self.frames_dropped - earlier.frames_dropped,
            frames_applied: self.frames_applied - earlier.frames_applied,
            frames_held: self.frames_held - earlier.frames_held,
            frames_malformed: self.frames_malformed - earlier.frames_malformed,
            ticks: self.ticks - earlier.ticks,
            frames_sent: self.frames_sent - earlier.frames_sent,
            reopen_attempts: self.reopen_attempts - earlier.reopen_attempts,
        }
    }
}
