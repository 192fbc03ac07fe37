//! Recorded per-tick telemetry in the host's data-collection row format:
//! `x_distance,y_distance,vel_x,vel_y[,angle]`.

use crate::controller::TickInput;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TelemetryFrame {
    pub input: TickInput,
    /// Lander rotation in degrees, when the row carries one.
    pub angle: Option<f64>,
}

pub fn parse_trace(data: &str) -> Result<Vec<TelemetryFrame>> {
    let mut frames = Vec::new();
    let mut seen_row = false;
    for (idx, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let first_row = !seen_row;
        seen_row = true;
        if first_row && is_header(trimmed) {
            continue;
        }
        let frame = parse_row(trimmed).with_context(|| format!("line {}", idx + 1))?;
        frames.push(frame);
    }
    Ok(frames)
}

pub fn read_trace(path: &Path) -> Result<Vec<TelemetryFrame>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed reading trace {}", path.display()))?;
    parse_trace(&data).with_context(|| format!("invalid trace {}", path.display()))
}

fn is_header(line: &str) -> bool {
    line.split(',')
        .next()
        .map(|field| field.trim().parse::<f64>().is_err())
        .unwrap_or(false)
}

fn parse_row(line: &str) -> Result<TelemetryFrame> {
    let mut values = Vec::with_capacity(5);
    for field in line.split(',') {
        let field = field.trim();
        let value = field
            .parse::<f64>()
            .with_context(|| format!("invalid number '{field}'"))?;
        values.push(value);
    }

    let (input, angle) = match values.as_slice() {
        [x, y, vx, vy] => (TickInput::new(*x, *y, *vx, *vy), None),
        [x, y, vx, vy, angle] => (TickInput::new(*x, *y, *vx, *vy), Some(*angle)),
        other => return Err(anyhow!("expected 4 or 5 columns, got {}", other.len())),
    };

    input.validate()?;
    if let Some(angle) = angle {
        if !angle.is_finite() {
            return Err(anyhow!("non-finite angle: {angle}"));
        }
    }
    Ok(TelemetryFrame { input, angle })
}
