//! Fixed-rate output loop.
//!
//! Every tick renders the current lights (or the manual override) into a
//! channel frame and hands it to the transport. The loop never waits on the
//! decode path and never exits because the device is missing: an absent
//! device is reopened on the next tick instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, enabled, info, trace, warn, Level};

use crate::fixture::{render_channels, CHANNELS_PER_FIXTURE};
use crate::light_state::LightState;
use crate::manual::{override_pattern, ManualOverride};
use crate::stats::Stats;
use crate::topology::MAX_FIXTURES;
use crate::transport::Transport;

/// First fixture is patched at channel 1
pub const START_CHANNEL: u16 = 1;

/// Channels covered by the largest topology
pub const MAX_FIXTURE_CHANNELS: usize = MAX_FIXTURES * CHANNELS_PER_FIXTURE;

/// Periods the loop may fall behind before the backlog is dropped
const MAX_LAG_PERIODS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Submitted this many channels
    Sent(usize),
    /// Device came back this tick; output resumes next tick
    Reopened,
    /// Device absent and could not be reopened
    Unavailable,
    /// Submission failed and the device was closed
    WriteFailed,
}

pub struct OutputScheduler<T: Transport> {
    transport: T,
    state: Arc<LightState>,
    manual: Arc<ManualOverride>,
    stats: Arc<Stats>,
    period: Duration,
    /// Channels submitted last tick, so a shrinking frame can blank the rest
    last_len: usize,
    reported_absent: bool,
}

impl<T: Transport> OutputScheduler<T> {
    pub fn new(
        transport: T,
        state: Arc<LightState>,
        manual: Arc<ManualOverride>,
        stats: Arc<Stats>,
        period: Duration,
    ) -> Self {
        OutputScheduler {
            transport,
            state,
            manual,
            stats,
            period,
            last_len: 0,
            reported_absent: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Channel frame for the current state: 7 channels per active fixture
    pub fn render(&self) -> Vec<u8> {
        let snapshot = self.state.snapshot();

        match self.manual.active() {
            Some(index) => {
                let (fixtures, strobe) = override_pattern(index, snapshot.topology);
                render_channels(&fixtures, strobe, u8::MAX)
            }
            None => render_channels(&snapshot.fixtures, snapshot.strobe, snapshot.dimming),
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        Stats::incr(&self.stats.ticks);

        if !self.transport.is_open() {
            return self.reopen();
        }

        let mut frame = self.render();
        let rendered = frame.len();
        if rendered < self.last_len {
            frame.resize(self.last_len, 0);
        }

        if enabled!(Level::TRACE) {
            let hex: String = frame
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");
            trace!("Channels {}..: {}", START_CHANNEL, hex);
        }

        match self.transport.set_channel_range(START_CHANNEL, &frame) {
            Ok(()) => {
                self.last_len = rendered;
                Stats::incr(&self.stats.frames_sent);
                TickOutcome::Sent(frame.len())
            }
            Err(e) => {
                warn!("Output {} failed: {}", self.transport.describe(), e);
                self.transport.close();
                TickOutcome::WriteFailed
            }
        }
    }

    fn reopen(&mut self) -> TickOutcome {
        if !self.reported_absent {
            warn!(
                "Output {} unavailable, retrying every tick",
                self.transport.describe()
            );
            self.reported_absent = true;
        }

        Stats::incr(&self.stats.reopen_attempts);
        match self.transport.open() {
            Ok(()) => {
                info!("✓ Output {} connected", self.transport.describe());
                self.reported_absent = false;
                // Fixtures hold their last slots across a reconnect, so the
                // first frame blanks every fixture the largest topology uses
                self.last_len = MAX_FIXTURE_CHANNELS;
                TickOutcome::Reopened
            }
            Err(e) => {
                trace!("Reopen failed: {}", e);
                TickOutcome::Unavailable
            }
        }
    }

    /// Tick at the configured period until `running` goes false
    pub fn run(&mut self, running: &AtomicBool) {
        debug!("Output loop running every {:?}", self.period);
        let mut next_deadline = Instant::now();

        while running.load(Ordering::Relaxed) {
            self.tick();

            next_deadline += self.period;
            let now = Instant::now();
            if now < next_deadline {
                thread::sleep(next_deadline - now);
            } else if now - next_deadline > self.period * MAX_LAG_PERIODS {
                debug!("Output loop fell behind by {:?}, skipping backlog", now - next_deadline);
                next_deadline = now;
            }
        }
    }

    /// Best-effort: zero every fixture channel before exit
    pub fn blackout(&mut self) {
        if !self.transport.is_open() && self.transport.open().is_err() {
            debug!("Skipping blackout, {} not open", self.transport.describe());
            return;
        }

        let blank = vec![0u8; MAX_FIXTURE_CHANNELS.max(self.last_len)];
        match self.transport.set_channel_range(START_CHANNEL, &blank) {
            Ok(()) => info!("Fixtures blanked"),
            Err(e) => warn!("Failed to blank {}: {}", self.transport.describe(), e),
        }
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::frame::{frame_with, Indicator, RawStatusFrame};
    use crate::topology::Topology;
    use std::io;

    #[derive(Default)]
    struct MockTransport {
        open: bool,
        /// Open attempts that fail before one succeeds
        failing_opens: usize,
        fail_next_write: bool,
        open_calls: usize,
        writes: Vec<(u16, Vec<u8>)>,
    }

    impl MockTransport {
        fn present() -> Self {
            MockTransport {
                open: true,
                ..Default::default()
            }
        }

        fn last_write(&self) -> &[u8] {
            &self.writes.last().expect("no writes").1
        }
    }

    impl Transport for MockTransport {
        fn open(&mut self) -> Result<(), TransportError> {
            self.open_calls += 1;
            if self.failing_opens > 0 {
                self.failing_opens -= 1;
                return Err(TransportError::Unavailable);
            }
            self.open = true;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn set_channel_range(&mut self, start: u16, values: &[u8]) -> Result<(), TransportError> {
            if !self.open {
                return Err(TransportError::Unavailable);
            }
            if self.fail_next_write {
                self.fail_next_write = false;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged").into());
            }
            self.writes.push((start, values.to_vec()));
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn describe(&self) -> &str {
            "mock"
        }
    }

    struct Rig {
        state: Arc<LightState>,
        manual: Arc<ManualOverride>,
        stats: Arc<Stats>,
    }

    impl Rig {
        fn new(topology: Topology) -> Self {
            Rig::dimmed(topology, 255)
        }

        fn dimmed(topology: Topology, dimming: u8) -> Self {
            Rig {
                state: Arc::new(LightState::new(topology, dimming)),
                manual: Arc::new(ManualOverride::new()),
                stats: Arc::new(Stats::default()),
            }
        }

        fn scheduler(
            &self,
            transport: MockTransport,
            period: Duration,
        ) -> OutputScheduler<MockTransport> {
            OutputScheduler::new(
                transport,
                Arc::clone(&self.state),
                Arc::clone(&self.manual),
                Arc::clone(&self.stats),
                period,
            )
        }

        fn publish(&self, lit: &[(Indicator, usize)], strobe: u8) {
            let frame = RawStatusFrame::capture(&frame_with(lit, strobe)).unwrap();
            self.state.publish(&frame);
        }
    }

    const PERIOD: Duration = Duration::from_millis(16);

    #[test]
    fn test_idle_state_sends_all_off() {
        let rig = Rig::new(Topology::Four);
        let mut scheduler = rig.scheduler(MockTransport::present(), PERIOD);

        assert_eq!(scheduler.tick(), TickOutcome::Sent(28));
        let (start, values) = &scheduler.transport().writes[0];
        assert_eq!(*start, 1);
        for chunk in values.chunks(CHANNELS_PER_FIXTURE) {
            assert_eq!(chunk, &[255, 0, 0, 0, 0, 0, 0]);
        }
    }

    #[test]
    fn test_frame_lengths_per_topology() {
        for (topology, len) in [(Topology::Two, 14), (Topology::Four, 28), (Topology::Eight, 56)] {
            let rig = Rig::new(topology);
            let mut scheduler = rig.scheduler(MockTransport::present(), PERIOD);
            assert_eq!(scheduler.tick(), TickOutcome::Sent(len));
        }
    }

    #[test]
    fn test_renders_decoded_lights_with_dimming() {
        let rig = Rig::dimmed(Topology::Two, 96);
        rig.publish(&[(Indicator::Red, 0), (Indicator::Orange, 3)], 0);
        let mut scheduler = rig.scheduler(MockTransport::present(), PERIOD);

        scheduler.tick();
        assert_eq!(
            scheduler.transport().last_write(),
            &[96, 255, 0, 0, 0, 0, 0, 96, 255, 128, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_strobe_channel_rendered() {
        let rig = Rig::new(Topology::Two);
        rig.publish(&[], 191);
        let mut scheduler = rig.scheduler(MockTransport::present(), PERIOD);

        scheduler.tick();
        assert_eq!(
            scheduler.transport().last_write(),
            &[255, 255, 255, 255, 0, 240, 0, 255, 255, 255, 255, 0, 240, 0]
        );
    }

    #[test]
    fn test_topology_shrink_blanks_stale_fixtures() {
        let rig = Rig::new(Topology::Eight);
        let all_red: Vec<_> = (0..8).map(|bank| (Indicator::Red, bank)).collect();
        rig.publish(&all_red, 0);
        let mut scheduler = rig.scheduler(MockTransport::present(), PERIOD);

        assert_eq!(scheduler.tick(), TickOutcome::Sent(56));

        rig.state.set_topology(Topology::Two);
        assert_eq!(scheduler.tick(), TickOutcome::Sent(56));
        let values = scheduler.transport().last_write();
        assert_eq!(&values[..14], &[255, 255, 0, 0, 0, 0, 0, 255, 255, 0, 0, 0, 0, 0]);
        assert!(values[14..].iter().all(|&b| b == 0));

        assert_eq!(scheduler.tick(), TickOutcome::Sent(14));
    }

    #[test]
    fn test_manual_override_supersedes_lights() {
        let rig = Rig::dimmed(Topology::Four, 10);
        rig.publish(&[], 64);
        let mut scheduler = rig.scheduler(MockTransport::present(), PERIOD);

        rig.manual.toggle(2, Topology::Four);
        scheduler.tick();
        let values = scheduler.transport().last_write().to_vec();
        assert_eq!(&values[14..21], &[255, 0, 0, 255, 0, 0, 0]);
        for fixture in [0, 1, 3] {
            let chunk = &values[fixture * 7..fixture * 7 + 7];
            assert_eq!(&chunk[1..], &[0, 0, 0, 0, 0, 0]);
        }

        // clearing resumes the decoded strobe at once
        rig.manual.toggle(2, Topology::Four);
        scheduler.tick();
        assert_eq!(&scheduler.transport().last_write()[..7], &[10, 255, 255, 255, 0, 220, 0]);
    }

    #[test]
    fn test_absent_device_retried_every_tick() {
        let rig = Rig::new(Topology::Four);
        let transport = MockTransport {
            failing_opens: 3,
            ..Default::default()
        };
        let mut scheduler = rig.scheduler(transport, PERIOD);

        for _ in 0..3 {
            assert_eq!(scheduler.tick(), TickOutcome::Unavailable);
        }
        assert_eq!(scheduler.tick(), TickOutcome::Reopened);
        assert_eq!(scheduler.tick(), TickOutcome::Sent(56));
        assert_eq!(scheduler.tick(), TickOutcome::Sent(28));

        assert_eq!(scheduler.transport().open_calls, 4);
        assert_eq!(scheduler.transport().writes.len(), 2);
        assert_eq!(rig.stats.sample().reopen_attempts, 4);
    }

    #[test]
    fn test_write_failure_closes_and_recovers() {
        let rig = Rig::new(Topology::Two);
        let transport = MockTransport {
            fail_next_write: true,
            ..MockTransport::present()
        };
        let mut scheduler = rig.scheduler(transport, PERIOD);

        assert_eq!(scheduler.tick(), TickOutcome::WriteFailed);
        assert!(!scheduler.transport().is_open());
        assert_eq!(scheduler.tick(), TickOutcome::Reopened);
        assert_eq!(scheduler.tick(), TickOutcome::Sent(56));
        assert_eq!(scheduler.tick(), TickOutcome::Sent(14));
    }

    #[test]
    fn test_shrink_during_outage_blanks_after_reconnect() {
        let rig = Rig::new(Topology::Eight);
        let all_red: Vec<_> = (0..8).map(|bank| (Indicator::Red, bank)).collect();
        rig.publish(&all_red, 0);
        let mut scheduler = rig.scheduler(MockTransport::present(), PERIOD);
        assert_eq!(scheduler.tick(), TickOutcome::Sent(56));

        scheduler.transport.fail_next_write = true;
        assert_eq!(scheduler.tick(), TickOutcome::WriteFailed);
        rig.state.set_topology(Topology::Two);
        assert_eq!(scheduler.tick(), TickOutcome::Reopened);
        assert_eq!(scheduler.tick(), TickOutcome::Sent(56));
        assert_eq!(scheduler.tick(), TickOutcome::Sent(14));

        // Replay onto a line whose fixtures hold their last received slots
        let mut line = [0u8; MAX_FIXTURE_CHANNELS];
        for (start, values) in &scheduler.transport().writes {
            let offset = usize::from(*start) - 1;
            line[offset..offset + values.len()].copy_from_slice(values);
        }
        let lit: Vec<usize> = line
            .chunks(CHANNELS_PER_FIXTURE)
            .enumerate()
            .filter(|(_, chunk)| chunk[1] != 0)
            .map(|(fixture, _)| fixture)
            .collect();
        assert_eq!(lit, vec![0, 1]);
    }

    #[test]
    fn test_run_keeps_ticking_without_device() {
        let rig = Rig::new(Topology::Four);
        let transport = MockTransport {
            failing_opens: usize::MAX,
            ..Default::default()
        };
        let mut scheduler = rig.scheduler(transport, Duration::from_millis(2));
        let running = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            scheduler.run(&flag);
            scheduler
        });
        thread::sleep(Duration::from_millis(100));
        running.store(false, Ordering::Relaxed);
        let scheduler = handle.join().unwrap();

        let opens = scheduler.transport().open_calls;
        assert!(opens >= 10, "only {} reopen attempts", opens);
        assert_eq!(rig.stats.sample().ticks as usize, opens);
        assert!(scheduler.transport().writes.is_empty());
    }

    #[test]
    fn test_run_transmits_once_device_appears() {
        let rig = Rig::new(Topology::Two);
        let transport = MockTransport {
            failing_opens: 5,
            ..Default::default()
        };
        let mut scheduler = rig.scheduler(transport, Duration::from_millis(2));
        let running = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            scheduler.run(&flag);
            scheduler
        });
        thread::sleep(Duration::from_millis(100));
        running.store(false, Ordering::Relaxed);
        let scheduler = handle.join().unwrap();

        assert_eq!(scheduler.transport().open_calls, 6);
        let first = &scheduler.transport().writes[0].1;
        assert_eq!(first.len(), MAX_FIXTURE_CHANNELS);
        assert!(first[14..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_blackout_zeroes_all_fixture_channels() {
        let rig = Rig::new(Topology::Four);
        rig.publish(&[(Indicator::Blue, 0)], 0);
        let mut scheduler = rig.scheduler(MockTransport::present(), PERIOD);
        scheduler.tick();

        scheduler.blackout();
        let (start, values) = scheduler.transport().writes.last().unwrap();
        assert_eq!(*start, 1);
        assert_eq!(values, &vec![0u8; 56]);
        assert!(!scheduler.transport().is_open());
    }
}
