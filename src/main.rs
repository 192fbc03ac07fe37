use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use lander_autopilot::controller::{
    AutopilotController, ControlState, ControllerConfig, TickInput,
};
use lander_autopilot::network::{InferenceEngine, NetworkParameters};
use lander_autopilot::runner::{replay_batch, replay_trace, write_commands};
use lander_autopilot::util::{parse_pair, parse_path_csv, trace_files_in, write_bytes};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lander-autopilot")]
#[command(about = "Hybrid neural/deterministic landing autopilot and trace replayer")]
struct Cli {
    /// Network parameters JSON (defaults to the built-in pretrained weights)
    #[arg(long, global = true)]
    weights: Option<PathBuf>,
    /// Controller config JSON (fallback policy, status interval)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the network on one "x,y" distance-to-target row
    Predict {
        #[arg(long, allow_hyphen_values = true)]
        input: String,
    },
    /// Compute commands for a single tick of a fresh episode
    Tick {
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
        #[arg(long, allow_hyphen_values = true)]
        vx: f64,
        #[arg(long, allow_hyphen_values = true)]
        vy: f64,
    },
    /// Replay a recorded telemetry trace as one autopilot episode
    Replay {
        #[arg(long)]
        input: PathBuf,
        /// Write one command byte per tick (left=0x01, right=0x02, thrust=0x04)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Write per-tick guidance and metrics as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Replay many traces in parallel, one episode each
    Batch {
        /// Comma-separated trace paths
        #[arg(long)]
        traces: Option<String>,
        /// Directory of .csv traces
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        jobs: Option<usize>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write the active network parameters as JSON
    ExportWeights {
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lander_autopilot=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        weights,
        config,
        command,
    } = Cli::parse();

    let engine = match &weights {
        Some(path) => InferenceEngine::new(&NetworkParameters::from_file(path)?)?,
        None => InferenceEngine::pretrained(),
    };
    let config = match &config {
        Some(path) => ControllerConfig::from_file(path)?,
        None => ControllerConfig::default(),
    };
    let controller = AutopilotController::new(engine, config);

    match command {
        Commands::Predict { input } => {
            let (x, y) = parse_pair(&input)?;
            let suggestion = controller.engine().predict(x, y)?;
            println!("vx={:.6}", suggestion.vx);
            println!("vy={:.6}", suggestion.vy);
        }
        Commands::Tick { x, y, vx, vy } => {
            let mut state = ControlState::new();
            let outcome = controller.tick_detailed(&mut state, TickInput::new(x, y, vx, vy))?;
            let guidance = outcome.guidance;
            if let Some(suggestion) = guidance.suggestion {
                println!("nn_vx={:.4}", suggestion.vx);
                println!("nn_vy={:.4}", suggestion.vy);
            }
            println!("desired_vx={:.4}", guidance.desired.vx);
            println!("desired_vy={:.4}", guidance.desired.vy);
            println!("target_vx={:.4}", guidance.target.vx);
            println!("target_vy={:.4}", guidance.target.vy);
            println!("branch={}", guidance.branch.as_str());
            println!("up={}", outcome.commands.thrust_up);
            println!("left={}", outcome.commands.steer_left);
            println!("right={}", outcome.commands.steer_right);
        }
        Commands::Replay {
            input,
            output,
            report,
        } => {
            let artifact = replay_trace(&controller, &input)?;
            if let Some(path) = &output {
                write_commands(path, &artifact.commands)?;
            }
            if let Some(path) = &report {
                let encoded = serde_json::to_vec_pretty(&serde_json::json!({
                    "metrics": artifact.metrics,
                    "ticks": artifact.ticks,
                }))?;
                write_bytes(path, &encoded)?;
            }

            let metrics = &artifact.metrics;
            println!("input={}", input.display());
            println!("ticks={}", metrics.tick_count);
            println!("action_ticks={}", metrics.action_ticks);
            println!("thrust_ticks={}", metrics.thrust_ticks);
            println!("left_ticks={}", metrics.left_ticks);
            println!("right_ticks={}", metrics.right_ticks);
            println!("attitude_corrections={}", metrics.attitude_corrections);
            println!(
                "branches=close_range:{},network_stalled:{},implausible_horizontal:{},network:{},inference_fallback:{}",
                metrics.branches.close_range,
                metrics.branches.network_stalled,
                metrics.branches.implausible_horizontal,
                metrics.branches.network,
                metrics.branches.inference_fallback,
            );
            if let Some(path) = output {
                println!("output={}", path.display());
            }
            if let Some(path) = report {
                println!("report={}", path.display());
            }
        }
        Commands::Batch {
            traces,
            dir,
            jobs,
            output,
        } => {
            let paths = match (traces.as_deref(), dir.as_deref()) {
                (Some(csv), None) => parse_path_csv(csv)?,
                (None, Some(dir)) => trace_files_in(dir)?,
                (Some(_), Some(_)) => {
                    return Err(anyhow!("use either --traces or --dir, not both"))
                }
                (None, None) => return Err(anyhow!("batch needs --traces or --dir")),
            };
            let report = replay_batch(&controller, &paths, jobs)?;
            let encoded = serde_json::to_vec_pretty(&report)?;

            if let Some(path) = output {
                write_bytes(&path, &encoded)?;
                println!("traces={}", report.trace_count);
                println!(
                    "jobs={}",
                    report
                        .jobs
                        .map(|value| value.to_string())
                        .unwrap_or_else(|| "auto".to_string())
                );
                println!("total_ticks={}", report.total_ticks);
                println!("output={}", path.display());
            } else {
                println!("{}", String::from_utf8_lossy(&encoded));
            }
        }
        Commands::ExportWeights { output } => {
            let params = controller.engine().parameters();
            if let Some(path) = output {
                params.write_file(&path)?;
                println!("wrote={}", path.display());
            } else {
                println!("{}", serde_json::to_string_pretty(&params)?);
            }
        }
    }

    Ok(())
}
