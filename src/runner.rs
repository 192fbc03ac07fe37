use crate::controller::{
    hold_attitude, AutopilotController, CommandFlags, ControlState, ReconcileBranch, TickOutcome,
};
use crate::telemetry::{read_trace, TelemetryFrame};
use crate::util::write_bytes;
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BranchCounts {
    pub close_range: u32,
    pub network_stalled: u32,
    pub implausible_horizontal: u32,
    pub network: u32,
    pub inference_fallback: u32,
}

impl BranchCounts {
    fn record(&mut self, branch: ReconcileBranch) {
        let slot = match branch {
            ReconcileBranch::CloseRange => &mut self.close_range,
            ReconcileBranch::NetworkStalled => &mut self.network_stalled,
            ReconcileBranch::ImplausibleHorizontal => &mut self.implausible_horizontal,
            ReconcileBranch::Network => &mut self.network,
            ReconcileBranch::InferenceFallback => &mut self.inference_fallback,
        };
        *slot += 1;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunMetrics {
    pub source: String,
    pub tick_count: u32,
    pub action_ticks: u32,
    pub thrust_ticks: u32,
    pub left_ticks: u32,
    pub right_ticks: u32,
    pub attitude_corrections: u32,
    pub branches: BranchCounts,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ReplayTick {
    pub outcome: TickOutcome,
    /// Rotation after the attitude hold, when the trace carries one.
    pub angle: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct ReplayArtifact {
    pub metrics: RunMetrics,
    pub ticks: Vec<ReplayTick>,
    pub commands: Vec<u8>,
}

/// Replays one trace as a single autopilot episode.
pub fn replay_frames(
    controller: &AutopilotController,
    source: &str,
    frames: &[TelemetryFrame],
) -> Result<ReplayArtifact> {
    if frames.is_empty() {
        return Err(anyhow!("trace {source} has no ticks"));
    }

    let mut state = ControlState::new();
    state.reset();

    let mut metrics = RunMetrics {
        source: source.to_string(),
        ..RunMetrics::default()
    };
    let mut ticks = Vec::with_capacity(frames.len());
    let mut commands = Vec::with_capacity(frames.len());

    for (idx, frame) in frames.iter().enumerate() {
        let outcome = controller
            .tick_detailed(&mut state, frame.input)
            .with_context(|| format!("tick {idx} of {source}"))?;
        let angle = frame.angle.map(|angle| {
            let held = hold_attitude(angle);
            if held != angle {
                metrics.attitude_corrections += 1;
            }
            held
        });

        record(&mut metrics, outcome.commands);
        metrics.branches.record(outcome.guidance.branch);
        commands.push(outcome.commands.to_byte());
        ticks.push(ReplayTick { outcome, angle });
    }

    tracing::info!(
        source,
        ticks = metrics.tick_count,
        thrust = metrics.thrust_ticks,
        left = metrics.left_ticks,
        right = metrics.right_ticks,
        "replay finished"
    );

    Ok(ReplayArtifact {
        metrics,
        ticks,
        commands,
    })
}

fn record(metrics: &mut RunMetrics, flags: CommandFlags) {
    metrics.tick_count += 1;
    if flags.to_byte() != 0 {
        metrics.action_ticks += 1;
    }
    if flags.thrust_up {
        metrics.thrust_ticks += 1;
    }
    if flags.steer_left {
        metrics.left_ticks += 1;
    }
    if flags.steer_right {
        metrics.right_ticks += 1;
    }
}

pub fn replay_trace(controller: &AutopilotController, path: &Path) -> Result<ReplayArtifact> {
    let frames = read_trace(path)?;
    replay_frames(controller, &path.display().to_string(), &frames)
}

pub fn write_commands(path: &Path, commands: &[u8]) -> Result<()> {
    write_bytes(path, commands)
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchReport {
    pub trace_count: usize,
    pub jobs: Option<usize>,
    pub total_ticks: u64,
    pub runs: Vec<RunMetrics>,
}

/// Replays every trace as its own episode, in parallel. Runs are reported in path order.
pub fn replay_batch(
    controller: &AutopilotController,
    traces: &[PathBuf],
    jobs: Option<usize>,
) -> Result<BatchReport> {
    if traces.is_empty() {
        return Err(anyhow!("batch replay requires at least one trace"));
    }
    if let Some(jobs) = jobs {
        if jobs == 0 {
            return Err(anyhow!("batch --jobs must be >= 1 when provided"));
        }
    }

    let mut sorted = traces.to_vec();
    sorted.sort();
    sorted.dedup();

    let run_one = |path: &PathBuf| -> Result<RunMetrics> {
        let artifact = replay_trace(controller, path)
            .with_context(|| format!("batch replay failed for {}", path.display()))?;
        Ok(artifact.metrics)
    };

    let results: Vec<Result<RunMetrics>> = if let Some(jobs) = jobs {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("failed to build rayon threadpool")?;
        pool.install(|| sorted.par_iter().map(run_one).collect())
    } else {
        sorted.par_iter().map(run_one).collect()
    };

    let mut runs = Vec::with_capacity(results.len());
    for result in results {
        runs.push(result?);
    }
    let total_ticks = runs.iter().map(|r| r.tick_count as u64).sum();

    Ok(BatchReport {
        trace_count: runs.len(),
        jobs,
        total_ticks,
        runs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::TickInput;

    fn frame(x: f64, y: f64, vx: f64, vy: f64, angle: Option<f64>) -> TelemetryFrame {
        TelemetryFrame {
            input: TickInput::new(x, y, vx, vy),
            angle,
        }
    }

    #[test]
    fn replay_counts_commands_and_branches() {
        let controller = AutopilotController::default();
        let frames = [
            frame(0.0, 250.0, 0.0, 0.0, None),
            frame(0.0, 10.0, 0.0, 1.5, Some(90.0)),
            frame(40.0, 15.0, 1.0, 0.2, Some(0.0)),
        ];
        let artifact = replay_frames(&controller, "inline", &frames).unwrap();

        assert_eq!(artifact.commands, vec![0x00, 0x04, 0x01]);
        assert_eq!(artifact.metrics.tick_count, 3);
        assert_eq!(artifact.metrics.action_ticks, 2);
        assert_eq!(artifact.metrics.thrust_ticks, 1);
        assert_eq!(artifact.metrics.left_ticks, 1);
        assert_eq!(artifact.metrics.right_ticks, 0);
        assert_eq!(artifact.metrics.attitude_corrections, 1);
        assert_eq!(artifact.metrics.branches.network_stalled, 1);
        assert_eq!(artifact.metrics.branches.close_range, 2);
        assert_eq!(artifact.ticks[1].angle, Some(30.0));
        assert_eq!(artifact.ticks[2].angle, Some(0.0));
    }

    #[test]
    fn replay_rejects_empty_trace() {
        let controller = AutopilotController::default();
        assert!(replay_frames(&controller, "empty", &[]).is_err());
    }

    #[test]
    fn batch_rejects_zero_jobs() {
        let controller = AutopilotController::default();
        let traces = [PathBuf::from("a.csv")];
        let err = replay_batch(&controller, &traces, Some(0)).unwrap_err();
        assert!(err.to_string().contains("--jobs"));
    }
}
