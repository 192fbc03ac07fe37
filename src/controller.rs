//! Hybrid landing autopilot.
//!
//! Each tick the network's velocity suggestion is reconciled with a
//! distance-banded deterministic law, and the resulting target velocity is
//! turned into thrust/steer flags. Steering and thrust rules are evaluated in
//! a fixed order and only ever add commands; the first steering rule to fire
//! owns the direction for that tick.

use crate::constants::*;
use crate::error::{ensure_finite, InputError, InputField};
use crate::network::{InferenceEngine, VelocitySuggestion};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Approach,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approach => "approach",
        }
    }
}

/// Per-episode state. Owned by the host and reset whenever the autopilot is
/// (re)engaged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControlState {
    pub phase: Phase,
    pub hover_start_time: u64,
    ticks: u64,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
        tracing::debug!("autopilot episode reset");
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Steer {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFlags {
    pub thrust_up: bool,
    pub steer_left: bool,
    pub steer_right: bool,
}

impl CommandFlags {
    pub fn steer(self) -> Option<Steer> {
        match (self.steer_left, self.steer_right) {
            (true, false) => Some(Steer::Left),
            (false, true) => Some(Steer::Right),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        (if self.steer_left { 0x01 } else { 0 })
            | (if self.steer_right { 0x02 } else { 0 })
            | (if self.thrust_up { 0x04 } else { 0 })
    }

    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        Self {
            steer_left: (byte & 0x01) != 0,
            steer_right: (byte & 0x02) != 0,
            thrust_up: (byte & 0x04) != 0,
        }
    }
}

// Accumulates one tick of commands. Steering is first-come: once a direction
// is latched, later rules cannot set the opposite one.
#[derive(Default)]
struct CommandLatch {
    thrust_up: bool,
    steer: Option<Steer>,
}

impl CommandLatch {
    fn thrust(&mut self) {
        self.thrust_up = true;
    }

    fn steer(&mut self, dir: Steer) {
        if self.steer.is_none() {
            self.steer = Some(dir);
        }
    }

    fn finish(self) -> CommandFlags {
        CommandFlags {
            thrust_up: self.thrust_up,
            steer_left: self.steer == Some(Steer::Left),
            steer_right: self.steer == Some(Steer::Right),
        }
    }
}

/// Host-supplied state for one tick. Offsets are target minus current position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TickInput {
    pub horizontal_offset: f64,
    pub vertical_offset: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
}

impl TickInput {
    pub fn new(
        horizontal_offset: f64,
        vertical_offset: f64,
        velocity_x: f64,
        velocity_y: f64,
    ) -> Self {
        Self {
            horizontal_offset,
            vertical_offset,
            velocity_x,
            velocity_y,
        }
    }

    pub fn validate(&self) -> Result<(), InputError> {
        ensure_finite(InputField::HorizontalOffset, self.horizontal_offset)?;
        ensure_finite(InputField::VerticalOffset, self.vertical_offset)?;
        ensure_finite(InputField::VelocityX, self.velocity_x)?;
        ensure_finite(InputField::VelocityY, self.velocity_y)?;
        Ok(())
    }

    #[inline]
    pub fn horizontal_distance(&self) -> f64 {
        self.horizontal_offset.abs()
    }

    #[inline]
    pub fn vertical_distance(&self) -> f64 {
        self.vertical_offset
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
}

impl Velocity {
    pub fn new(vx: f64, vy: f64) -> Self {
        Self { vx, vy }
    }
}

impl From<VelocitySuggestion> for Velocity {
    fn from(value: VelocitySuggestion) -> Self {
        Self::new(value.vx, value.vy)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileBranch {
    /// Below the trust altitude: deterministic desire only.
    CloseRange,
    /// Network vertical suggestion collapsed to ~0 while still high.
    NetworkStalled,
    /// Network horizontal suggestion out of plausible range.
    ImplausibleHorizontal,
    Network,
    InferenceFallback,
}

impl ReconcileBranch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CloseRange => "close_range",
            Self::NetworkStalled => "network_stalled",
            Self::ImplausibleHorizontal => "implausible_horizontal",
            Self::Network => "network",
            Self::InferenceFallback => "inference_fallback",
        }
    }
}

/// What to do when the network cannot produce a usable suggestion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum InferenceFallback {
    #[default]
    Deterministic,
    Fixed { vx: f64, vy: f64 },
}

impl InferenceFallback {
    /// Gentle descent with no lateral motion.
    pub fn legacy() -> Self {
        Self::Fixed { vx: 0.0, vy: 0.5 }
    }
}

fn default_status_interval_ticks() -> u32 {
    HOST_FPS
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub fallback: InferenceFallback,
    /// Ticks between landing-status events; 0 disables them.
    #[serde(default = "default_status_interval_ticks")]
    pub status_interval_ticks: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fallback: InferenceFallback::default(),
            status_interval_ticks: default_status_interval_ticks(),
        }
    }
}

impl ControllerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("failed reading controller config {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("invalid controller config {}", path.display()))
    }
}

/// Everything the controller decided on the way to a command set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Guidance {
    /// The suggestion that was reconciled, if any.
    pub suggestion: Option<VelocitySuggestion>,
    pub desired: Velocity,
    pub target: Velocity,
    pub branch: ReconcileBranch,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TickOutcome {
    pub guidance: Guidance,
    pub commands: CommandFlags,
}

#[inline]
fn toward(offset: f64, magnitude: f64) -> f64 {
    if offset > 0.0 {
        magnitude
    } else if offset < 0.0 {
        -magnitude
    } else {
        0.0
    }
}

/// Distance-banded velocity the lander should hold, far to near.
pub fn desired_velocity(horizontal_offset: f64, vertical_distance: f64) -> Velocity {
    let horizontal_distance = horizontal_offset.abs();

    let (mut vx, mut vy) = if vertical_distance > 200.0 {
        let mag = if horizontal_distance > 50.0 { 1.2 } else { 0.6 };
        (toward(horizontal_offset, mag), 1.2)
    } else if vertical_distance > 100.0 {
        let mag = if horizontal_distance > 30.0 { 0.8 } else { 0.3 };
        (toward(horizontal_offset, mag), 0.8)
    } else if vertical_distance > 50.0 {
        let mag = if horizontal_distance > 20.0 { 0.5 } else { 0.2 };
        (toward(horizontal_offset, mag), 0.6)
    } else {
        let vx = if horizontal_distance > 15.0 {
            toward(horizontal_offset, 0.3)
        } else if horizontal_distance > 5.0 {
            toward(horizontal_offset, 0.15)
        } else {
            0.0
        };
        (vx, 0.35)
    };

    if vertical_distance < 30.0 {
        vy = 0.25;
        if horizontal_distance < 5.0 {
            vx = 0.0;
        }
    }

    Velocity::new(vx, vy)
}

/// Picks the target velocity from the deterministic desire and the network suggestion.
pub fn reconcile(
    desired: Velocity,
    suggestion: VelocitySuggestion,
    horizontal_distance: f64,
    vertical_distance: f64,
) -> (Velocity, ReconcileBranch) {
    if vertical_distance < NETWORK_TRUST_MIN_VERTICAL {
        (desired, ReconcileBranch::CloseRange)
    } else if suggestion.vy.abs() < NETWORK_STALL_VY && vertical_distance > 50.0 {
        (desired, ReconcileBranch::NetworkStalled)
    } else if suggestion.vx.abs() > NETWORK_IMPLAUSIBLE_VX {
        let vy = suggestion.vy.clamp(TARGET_VY_MIN, TARGET_VY_MAX_IMPLAUSIBLE);
        (
            Velocity::new(desired.vx, vy),
            ReconcileBranch::ImplausibleHorizontal,
        )
    } else {
        let vx = if horizontal_distance < NETWORK_HORIZONTAL_TRUST_RANGE {
            suggestion.vx
        } else {
            desired.vx
        };
        let vy = suggestion.vy.clamp(TARGET_VY_MIN, TARGET_VY_MAX);
        (Velocity::new(vx, vy), ReconcileBranch::Network)
    }
}

/// Turns a target velocity into command flags. Rule order matters.
pub fn derive_commands(input: &TickInput, target: Velocity) -> CommandFlags {
    let horizontal_distance = input.horizontal_distance();
    let vertical_distance = input.vertical_distance();
    let vx = input.velocity_x;
    let vy = input.velocity_y;
    let mut latch = CommandLatch::default();

    // Base horizontal law.
    let vx_error = target.vx - vx;
    let vx_threshold = if vertical_distance > 100.0 {
        0.2
    } else if vertical_distance > 50.0 {
        0.15
    } else {
        0.1
    };
    if vx_error.abs() > vx_threshold {
        latch.steer(if vx_error > 0.0 {
            Steer::Right
        } else {
            Steer::Left
        });
    }

    // Base vertical law.
    let vy_threshold = if vertical_distance > 100.0 { 0.2 } else { 0.15 };
    if vy > target.vy + vy_threshold {
        latch.thrust();
    }

    // Descent-rate ceilings.
    if vertical_distance < 150.0 && vy > 1.2 {
        latch.thrust();
    }
    if vertical_distance < 80.0 && vy > 0.9 {
        latch.thrust();
    }
    if vertical_distance < 30.0 && vy > 0.6 {
        latch.thrust();
    }

    // Terminal approach: still well off the pad.
    if vertical_distance < 40.0 && horizontal_distance > 25.0 {
        latch.steer(if input.horizontal_offset > 0.0 {
            Steer::Right
        } else {
            Steer::Left
        });
        if vy > 0.4 {
            latch.thrust();
        }
    }

    let brake = if vx > 0.0 { Steer::Left } else { Steer::Right };

    if vertical_distance < 60.0 {
        if vx.abs() > 0.8 {
            latch.steer(brake);
            if vy > 0.3 {
                latch.thrust();
            }
        }
        if vy > 0.7 {
            latch.thrust();
        }
    }

    if vertical_distance < 20.0 {
        if vx.abs() > 0.3 {
            latch.steer(brake);
        }
        if vy > 0.4 {
            latch.thrust();
        }
    }

    latch.finish()
}

/// Snaps a rotation in degrees back to the nearest edge of the upright envelope.
pub fn hold_attitude(angle: f64) -> f64 {
    if angle > ATTITUDE_LIMIT_LOW && angle < ATTITUDE_LIMIT_HIGH {
        let span = ATTITUDE_LIMIT_HIGH - ATTITUDE_LIMIT_LOW;
        // Ties resolve to the low edge.
        if (angle - ATTITUDE_LIMIT_LOW) / span <= 0.5 {
            ATTITUDE_LIMIT_LOW
        } else {
            ATTITUDE_LIMIT_HIGH
        }
    } else {
        angle
    }
}

#[derive(Clone, Debug, Default)]
pub struct AutopilotController {
    engine: InferenceEngine,
    config: ControllerConfig,
}

impl AutopilotController {
    pub fn new(engine: InferenceEngine, config: ControllerConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Computes guidance for a validated input.
    pub fn guide(&self, input: &TickInput) -> Guidance {
        let horizontal_distance = input.horizontal_distance();
        let vertical_distance = input.vertical_distance();
        let desired = desired_velocity(input.horizontal_offset, vertical_distance);

        match self
            .engine
            .predict(input.horizontal_offset, input.vertical_offset)
        {
            Ok(suggestion) => {
                let (target, branch) =
                    reconcile(desired, suggestion, horizontal_distance, vertical_distance);
                Guidance {
                    suggestion: Some(suggestion),
                    desired,
                    target,
                    branch,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, fallback = ?self.config.fallback, "inference failed");
                match self.config.fallback {
                    InferenceFallback::Deterministic => Guidance {
                        suggestion: None,
                        desired,
                        target: desired,
                        branch: ReconcileBranch::InferenceFallback,
                    },
                    InferenceFallback::Fixed { vx, vy } => {
                        let suggestion = VelocitySuggestion { vx, vy };
                        let (target, _) =
                            reconcile(desired, suggestion, horizontal_distance, vertical_distance);
                        Guidance {
                            suggestion: Some(suggestion),
                            desired,
                            target,
                            branch: ReconcileBranch::InferenceFallback,
                        }
                    }
                }
            }
        }
    }

    pub fn tick(
        &self,
        state: &mut ControlState,
        input: TickInput,
    ) -> Result<CommandFlags, InputError> {
        self.tick_detailed(state, input)
            .map(|outcome| outcome.commands)
    }

    pub fn tick_detailed(
        &self,
        state: &mut ControlState,
        input: TickInput,
    ) -> Result<TickOutcome, InputError> {
        input.validate()?;

        let guidance = self.guide(&input);
        let commands = derive_commands(&input, guidance.target);

        let interval = u64::from(self.config.status_interval_ticks);
        if interval > 0 && state.ticks.is_multiple_of(interval) {
            tracing::debug!(
                tick = state.ticks,
                phase = state.phase.as_str(),
                x = input.horizontal_offset,
                y = input.vertical_offset,
                vx = input.velocity_x,
                vy = input.velocity_y,
                nn_vx = guidance.suggestion.map(|s| s.vx),
                nn_vy = guidance.suggestion.map(|s| s.vy),
                target_vx = guidance.target.vx,
                target_vy = guidance.target.vy,
                branch = guidance.branch.as_str(),
                up = commands.thrust_up,
                left = commands.steer_left,
                right = commands.steer_right,
                "landing status"
            );
        }
        state.ticks += 1;

        Ok(TickOutcome { guidance, commands })
    }
}
