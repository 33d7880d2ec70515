//! Receive path: sACN datagrams -> bounded queue -> decode worker -> light state
pub mod queue;
pub mod sacn;

use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::DecodeError;
use crate::frame::RawStatusFrame;
use crate::light_state::{LightState, Published};
use crate::stats::Stats;

use self::queue::FrameReceiver;

/// Slot data copied out of one received packet
#[derive(Debug, Clone)]
pub struct IngestFrame {
    pub received_at: Instant,
    pub data: Vec<u8>,
}

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Decodes queued frames in arrival order and publishes them
pub struct DecodeWorker {
    receiver: FrameReceiver,
    state: Arc<LightState>,
    stats: Arc<Stats>,
    last_arrival: Option<Instant>,
}

impl DecodeWorker {
    pub fn new(receiver: FrameReceiver, state: Arc<LightState>, stats: Arc<Stats>) -> Self {
        DecodeWorker {
            receiver,
            state,
            stats,
            last_arrival: None,
        }
    }

    /// Decode one frame. A malformed frame leaves the light state untouched.
    pub fn process(&mut self, frame: IngestFrame) -> Result<Published, DecodeError> {
        if let Some(last) = self.last_arrival {
            trace!(
                "+{:.2}ms",
                frame.received_at.saturating_duration_since(last).as_secs_f64() * 1000.0
            );
        }
        self.last_arrival = Some(frame.received_at);

        let raw = match RawStatusFrame::capture(&frame.data) {
            Ok(raw) => raw,
            Err(e) => {
                Stats::incr(&self.stats.frames_malformed);
                debug!("Dropping frame: {}", e);
                return Err(e);
            }
        };

        let published = self.state.publish(&raw);
        match published {
            Published::Applied { .. } => Stats::incr(&self.stats.frames_applied),
            Published::Held { strobe_code } => {
                Stats::incr(&self.stats.frames_held);
                debug!("Unrecognized strobe code {}, holding current lights", strobe_code);
            }
        }
        Ok(published)
    }

    /// Process frames until `running` goes false or the queue disconnects
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            match self.receiver.recv_timeout(RECV_TIMEOUT) {
                Ok(frame) => {
                    let _ = self.process(frame);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Decode worker stopped ({} frames left queued)", self.receiver.len());
    }
}

#[cfg(test)]
mod tests {
    use super::queue::{frame_queue, FrameSender, Pushed};
    use super::sacn;
    use super::*;
    use crate::fixture::{FixtureState, Intensity, StrobeLevel};
    use crate::frame::{frame_with, Indicator, FRAME_LEN};
    use crate::topology::Topology;
    use std::thread;

    fn ingest(data: Vec<u8>) -> IngestFrame {
        IngestFrame {
            received_at: Instant::now(),
            data,
        }
    }

    fn worker(topology: Topology) -> (FrameSender, DecodeWorker, Arc<LightState>, Arc<Stats>) {
        let (tx, rx) = frame_queue(16);
        let state = Arc::new(LightState::new(topology, 255));
        let stats = Arc::new(Stats::default());
        let worker = DecodeWorker::new(rx, Arc::clone(&state), Arc::clone(&stats));
        (tx, worker, state, stats)
    }

    #[test]
    fn test_malformed_frame_keeps_state_and_next_frame_decodes() {
        let (_tx, mut worker, state, stats) = worker(Topology::Eight);
        worker
            .process(ingest(frame_with(&[(Indicator::Blue, 0)], 0)))
            .unwrap();
        let before = state.snapshot();

        assert!(worker.process(ingest(vec![0; 20])).is_err());
        assert_eq!(*state.snapshot(), *before);

        let mut bad_start = frame_with(&[(Indicator::Red, 0)], 0);
        bad_start[0] = 0xCC;
        assert!(worker.process(ingest(bad_start)).is_err());
        assert_eq!(*state.snapshot(), *before);

        worker
            .process(ingest(frame_with(&[(Indicator::Red, 1)], 0)))
            .unwrap();
        let snap = state.snapshot();
        assert_eq!(snap.fixtures[0], FixtureState::OFF);
        assert_eq!(snap.fixtures[1].red, Intensity::Full);

        let sample = stats.sample();
        assert_eq!(sample.frames_malformed, 2);
        assert_eq!(sample.frames_applied, 2);
    }

    #[test]
    fn test_held_frames_counted() {
        let (_tx, mut worker, _state, stats) = worker(Topology::Two);
        let published = worker.process(ingest(frame_with(&[], 7))).unwrap();
        assert_eq!(published, Published::Held { strobe_code: 7 });
        assert_eq!(stats.sample().frames_held, 1);
    }

    #[test]
    fn test_run_decodes_in_arrival_order() {
        let (tx, mut worker, state, stats) = worker(Topology::Four);
        let running = Arc::new(AtomicBool::new(true));

        assert_eq!(tx.push(ingest(frame_with(&[(Indicator::Red, 0)], 0))), Pushed::Queued);
        tx.push(ingest(vec![0; 3]));
        tx.push(ingest(frame_with(&[], 191)));

        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || worker.run(&flag));

        let deadline = Instant::now() + Duration::from_secs(2);
        while stats.sample().frames_applied < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();

        let snap = state.snapshot();
        assert_eq!(snap.strobe, StrobeLevel::Fast);
        assert_eq!(snap.fixtures, vec![FixtureState::WHITE; 4]);
        assert_eq!(stats.sample().frames_malformed, 1);
    }

    #[test]
    fn test_sacn_packet_to_lights() {
        let (tx, mut worker, state, _stats) = worker(Topology::Eight);

        let mut values = vec![0u8; FRAME_LEN];
        values[Indicator::Green.slot(4)] = 255;
        let datagram = sacn::build_data_packet(1, 9, 0, &values);
        let packet = sacn::parse_packet(&datagram).unwrap().unwrap();
        tx.push(ingest(packet.values.to_vec()));

        let frame = worker.receiver.recv_timeout(Duration::from_millis(10)).unwrap();
        worker.process(frame).unwrap();
        assert_eq!(state.snapshot().fixtures[4].green, Intensity::Full);
    }
}
