use anyhow::Result;
use lander_autopilot::controller::{AutopilotController, ControllerConfig, InferenceFallback};
use lander_autopilot::network::{InferenceEngine, NetworkParameters};
use lander_autopilot::runner::{replay_batch, replay_trace, write_commands};
use lander_autopilot::util::trace_files_in;
use std::fs;

const DESCENT: &str = "\
x_distance,y_distance,vel_x,vel_y,angle
0,250,0,0,0
-300,400,0,0.5,0
200,180,0,0,45
40,15,1.0,0.2,0
0,10,0,1.5,300
";

#[test]
fn replaying_a_trace_file_writes_one_command_byte_per_tick() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let trace = tmp.path().join("descent.csv");
    fs::write(&trace, DESCENT)?;

    let controller = AutopilotController::default();
    let artifact = replay_trace(&controller, &trace)?;
    assert_eq!(artifact.metrics.tick_count, 5);
    assert_eq!(artifact.commands.len(), 5);
    assert_eq!(artifact.commands[0], 0x00);
    assert_eq!(artifact.commands[1], 0x05);
    assert_eq!(artifact.commands[3], 0x01);
    assert_eq!(artifact.commands[4], 0x04);
    assert_eq!(artifact.metrics.attitude_corrections, 2);
    assert_eq!(artifact.metrics.branches.network_stalled, 1);
    assert_eq!(artifact.metrics.branches.network, 1);
    assert_eq!(artifact.metrics.branches.implausible_horizontal, 1);
    assert_eq!(artifact.metrics.branches.close_range, 2);
    for tick in &artifact.ticks {
        let flags = tick.outcome.commands;
        assert!(!(flags.steer_left && flags.steer_right));
    }

    let out = tmp.path().join("out/descent.cmd");
    write_commands(&out, &artifact.commands)?;
    assert_eq!(fs::read(&out)?, artifact.commands);
    Ok(())
}

#[test]
fn batch_replay_reports_runs_in_path_order() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    fs::write(tmp.path().join("b.csv"), "0,10,0,1.5\n40,15,1.0,0.2\n")?;
    fs::write(tmp.path().join("a.csv"), DESCENT)?;
    fs::write(tmp.path().join("notes.txt"), "not a trace")?;

    let traces = trace_files_in(tmp.path())?;
    assert_eq!(traces.len(), 2);

    let controller = AutopilotController::default();
    let report = replay_batch(&controller, &traces, Some(2))?;
    assert_eq!(report.trace_count, 2);
    assert_eq!(report.total_ticks, 7);
    assert!(report.runs[0].source.ends_with("a.csv"));
    assert!(report.runs[1].source.ends_with("b.csv"));

    // Episodes are independent: the same trace gives the same metrics alone.
    let solo = replay_trace(&controller, &traces[1])?;
    assert_eq!(solo.metrics, report.runs[1]);
    Ok(())
}

#[test]
fn batch_replay_surfaces_bad_trace() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let good = tmp.path().join("good.csv");
    let bad = tmp.path().join("bad.csv");
    fs::write(&good, DESCENT)?;
    fs::write(&bad, "1,2,3\n")?;

    let controller = AutopilotController::default();
    let err = replay_batch(&controller, &[good, bad], None).unwrap_err();
    assert!(format!("{err:#}").contains("bad.csv"));
    Ok(())
}

#[test]
fn network_parameters_round_trip_through_json_file() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("weights/network.json");
    NetworkParameters::pretrained().write_file(&path)?;

    let loaded = NetworkParameters::from_file(&path)?;
    let pretrained = NetworkParameters::pretrained();
    assert_eq!(loaded, pretrained);
    let bits = |p: &NetworkParameters| -> Vec<u64> {
        [&p.weights_input_hidden, &p.weights_hidden_output]
            .into_iter()
            .flatten()
            .chain([&p.min_input, &p.max_input, &p.min_output, &p.max_output])
            .flatten()
            .map(|value| value.to_bits())
            .collect()
    };
    assert_eq!(bits(&loaded), bits(&pretrained));

    let engine = InferenceEngine::new(&loaded)?;
    let a = engine.predict(-120.0, 333.0)?;
    let b = InferenceEngine::pretrained().predict(-120.0, 333.0)?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn mismatched_parameter_file_fails_fast() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("network.json");
    let mut params = NetworkParameters::pretrained();
    params.weights_input_hidden.push(vec![0.0, 0.0]);
    fs::write(&path, serde_json::to_vec(&params)?)?;

    let err = NetworkParameters::from_file(&path).unwrap_err();
    let text = format!("{err:#}");
    assert!(text.contains("weights_input_hidden"), "{text}");
    assert!(text.contains("expected 4 rows, got 5"), "{text}");
    Ok(())
}

#[test]
fn controller_config_loads_from_file() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("controller.json");
    fs::write(
        &path,
        r#"{"fallback": {"policy": "fixed", "vx": 0.0, "vy": 0.5}, "status_interval_ticks": 0}"#,
    )?;

    let config = ControllerConfig::from_file(&path)?;
    assert_eq!(config.fallback, InferenceFallback::legacy());
    assert_eq!(config.status_interval_ticks, 0);

    fs::write(&path, r#"{"fallback": {"policy": "panic"}}"#)?;
    assert!(ControllerConfig::from_file(&path).is_err());
    Ok(())
}
