use anyhow::{Context, Result};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::ingest::queue::{frame_queue, Pushed};
use crate::ingest::sacn::SacnReceiver;
use crate::ingest::DecodeWorker;
use crate::light_state::LightState;
use crate::manual::ManualOverride;
use crate::operator;
use crate::scheduler::OutputScheduler;
use crate::stats::Stats;
use crate::transport::SerialDmxTransport;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// sACN in, DMX out
pub struct Bridge {
    config: Config,
    state: Arc<LightState>,
    manual: Arc<ManualOverride>,
    stats: Arc<Stats>,
    running: Arc<AtomicBool>,
    receiver: Option<SacnReceiver>,
    scheduler: OutputScheduler<SerialDmxTransport>,
    debug: bool,
}

impl Bridge {
    /// Get a clone of the running flag for signal handlers
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Bind the sACN socket and set up output. The output device does not
    /// need to be present yet.
    pub fn new(config: Config, debug: bool) -> Result<Self> {
        config.validate()?;

        let receiver = SacnReceiver::bind(&config.sacn.bind_address, config.sacn.universe)
            .context("Failed to start sACN receiver")?;

        let state = Arc::new(LightState::new(
            config.fixtures.topology,
            config.fixtures.dimming,
        ));
        let manual = Arc::new(ManualOverride::new());
        let stats = Arc::new(Stats::default());

        let scheduler = OutputScheduler::new(
            SerialDmxTransport::new(config.output.clone()),
            Arc::clone(&state),
            Arc::clone(&manual),
            Arc::clone(&stats),
            config.output.refresh_period(),
        );

        Ok(Bridge {
            config,
            state,
            manual,
            stats,
            running: Arc::new(AtomicBool::new(true)),
            receiver: Some(receiver),
            scheduler,
            debug,
        })
    }

    /// Run until the running flag is cleared
    pub fn run(&mut self) -> Result<()> {
        let receiver = self
            .receiver
            .take()
            .context("Bridge has already been run")?;

        info!(
            "✓ Listening for sACN universe {} on {}",
            self.config.sacn.universe, self.config.sacn.bind_address
        );
        info!(
            "Driving {} on {} at {} Hz (t: topology, d: dim, 0-7: test fixture, q: quit)",
            self.state.topology(),
            self.config.output.port,
            self.config.output.refresh_hz
        );

        let (sender, frames) = frame_queue(self.config.ingest.queue_capacity);

        let ingest_handle = {
            let running = Arc::clone(&self.running);
            let stats = Arc::clone(&self.stats);
            thread::Builder::new()
                .name("sacn-ingest".to_string())
                .spawn(move || {
                    receiver.run(&running, |frame| {
                        Stats::incr(&stats.frames_received);
                        match sender.push(frame) {
                            Pushed::Queued => {}
                            Pushed::DroppedOldest | Pushed::Closed => {
                                Stats::incr(&stats.frames_dropped)
                            }
                        }
                    });
                })?
        };

        let decode_handle = {
            let mut worker =
                DecodeWorker::new(frames, Arc::clone(&self.state), Arc::clone(&self.stats));
            let running = Arc::clone(&self.running);
            thread::Builder::new()
                .name("decode".to_string())
                .spawn(move || worker.run(&running))?
        };

        self.spawn_operator_thread();
        if self.debug {
            self.spawn_stats_thread();
        }

        // Output loop runs on this thread until shutdown
        self.scheduler.run(&self.running);

        join_worker("sACN ingest", ingest_handle);
        join_worker("decode", decode_handle);
        debug!("Receive threads stopped");

        Ok(())
    }

    /// Blank every fixture before exit
    pub fn shutdown(&mut self) {
        info!("Turning off fixtures...");
        self.running.store(false, Ordering::Relaxed);
        self.scheduler.blackout();
        info!("✓ Bridge stopped");
    }

    /// Stdin blocks, so this thread is left detached
    fn spawn_operator_thread(&self) {
        let state = Arc::clone(&self.state);
        let manual = Arc::clone(&self.manual);
        let running = Arc::clone(&self.running);

        thread::spawn(move || {
            operator::run(io::stdin().lock(), &state, &manual, &running);
        });
    }

    fn spawn_stats_thread(&self) {
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);

        thread::spawn(move || {
            let mut last = stats.sample();
            let secs = STATS_INTERVAL.as_secs_f64();

            while running.load(Ordering::Relaxed) {
                thread::sleep(STATS_INTERVAL);

                let current = stats.sample();
                let delta = current.since(&last);
                info!(
                    "[Stats] Received: {:.1} fps, applied: {:.1} fps, sent: {:.1} fps, held: {}, malformed: {}, dropped: {}, reopen attempts: {}",
                    delta.frames_received as f64 / secs,
                    delta.frames_applied as f64 / secs,
                    delta.frames_sent as f64 / secs,
                    delta.frames_held,
                    delta.frames_malformed,
                    delta.frames_dropped,
                    delta.reopen_attempts,
                );
                last = current;
            }
        });
    }
}

/// Join a worker thread, reporting a panic instead of discarding it
fn join_worker(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(_) => {
            warn!("{} thread panicked", name);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_worker_reports_panic() {
        assert!(join_worker("ok", thread::spawn(|| {})));

        let crashed = thread::spawn(|| panic!("worker crashed"));
        assert!(!join_worker("crashed", crashed));
    }
}
