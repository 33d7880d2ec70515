//! Operator commands read line by line from stdin.
//!
//! `t` cycles the topology, `d` steps the dimmer down, a digit toggles the
//! manual override for that fixture, `c` clears it, `s` logs the current
//! state and `q` stops the bridge.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::light_state::LightState;
use crate::manual::{ManualOverride, Toggled};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    CycleTopology,
    StepDimming,
    ToggleOverride(usize),
    ClearOverride,
    Status,
    Quit,
}

impl OperatorCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "t" => Some(OperatorCommand::CycleTopology),
            "d" => Some(OperatorCommand::StepDimming),
            "c" => Some(OperatorCommand::ClearOverride),
            "s" => Some(OperatorCommand::Status),
            "q" => Some(OperatorCommand::Quit),
            other => other
                .parse::<usize>()
                .ok()
                .filter(|&i| i < 8)
                .map(OperatorCommand::ToggleOverride),
        }
    }
}

/// Apply `command`. Returns false when the operator asked to quit.
pub fn apply(command: OperatorCommand, state: &LightState, manual: &ManualOverride) -> bool {
    match command {
        OperatorCommand::CycleTopology => {
            let topology = state.cycle_topology();
            manual.clamp_to(topology);
            info!("Topology: {}", topology);
        }
        OperatorCommand::StepDimming => {
            let dimming = state.step_dimming();
            info!("Dimming: {}", dimming);
        }
        OperatorCommand::ToggleOverride(index) => match manual.toggle(index, state.topology()) {
            Toggled::On(index) => info!("Manual override: fixture {} blue", index),
            Toggled::Off => info!("Manual override cleared"),
            Toggled::Ignored => warn!("No fixture {} in {}", index, state.topology()),
        },
        OperatorCommand::ClearOverride => {
            manual.clear();
            info!("Manual override cleared");
        }
        OperatorCommand::Status => {
            let snap = state.snapshot();
            let colors: Vec<String> = snap
                .fixtures
                .iter()
                .map(|f| {
                    let (r, g, b) = f.rgb();
                    format!("{:02x}{:02x}{:02x}", r, g, b)
                })
                .collect();
            info!(
                "{} | strobe {:?} | dimming {} | override {:?} | {}",
                snap.topology,
                snap.strobe,
                snap.dimming,
                manual.active(),
                colors.join(" ")
            );
        }
        OperatorCommand::Quit => return false,
    }
    true
}

/// Read commands until EOF, `q`, or `running` goes false
pub fn run<R: BufRead>(
    input: R,
    state: &LightState,
    manual: &ManualOverride,
    running: &AtomicBool,
) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        if !running.load(Ordering::Relaxed) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        match OperatorCommand::parse(&line) {
            Some(command) => {
                if !apply(command, state, manual) {
                    info!("Quit requested");
                    running.store(false, Ordering::Relaxed);
                    break;
                }
            }
            None => warn!("Unknown command '{}' (t, d, 0-7, c, s, q)", line.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Topology;
    use std::io::Cursor;

    #[test]
    fn test_parse() {
        assert_eq!(OperatorCommand::parse("t"), Some(OperatorCommand::CycleTopology));
        assert_eq!(OperatorCommand::parse(" d \n"), Some(OperatorCommand::StepDimming));
        assert_eq!(OperatorCommand::parse("7"), Some(OperatorCommand::ToggleOverride(7)));
        assert_eq!(OperatorCommand::parse("8"), None);
        assert_eq!(OperatorCommand::parse("x"), None);
    }

    #[test]
    fn test_cycle_clears_unreachable_override() {
        let state = LightState::new(Topology::Eight, 255);
        let manual = ManualOverride::new();
        apply(OperatorCommand::ToggleOverride(6), &state, &manual);
        assert_eq!(manual.active(), Some(6));

        apply(OperatorCommand::CycleTopology, &state, &manual);
        assert_eq!(state.topology(), Topology::Two);
        assert_eq!(manual.active(), None);
    }

    #[test]
    fn test_dim_step_applies_with_info_filtered() {
        let state = LightState::new(Topology::Four, 255);
        let manual = ManualOverride::new();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_test_writer()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            apply(OperatorCommand::StepDimming, &state, &manual);
            apply(OperatorCommand::StepDimming, &state, &manual);
        });
        assert_eq!(state.snapshot().dimming, 223);
    }

    #[test]
    fn test_run_script() {
        let state = LightState::new(Topology::Two, 255);
        let manual = ManualOverride::new();
        let running = AtomicBool::new(true);

        let script = Cursor::new("t\nd\nd\n3\nbogus\ns\nq\nt\n");
        run(script, &state, &manual, &running);

        assert!(!running.load(Ordering::Relaxed));
        assert_eq!(state.topology(), Topology::Four);
        assert_eq!(state.snapshot().dimming, 223);
        assert_eq!(manual.active(), Some(3));
    }
}
