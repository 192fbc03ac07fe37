pub mod constants;
pub mod controller;
pub mod error;
pub mod network;
pub mod runner;
pub mod telemetry;
pub mod util;

pub use controller::{
    AutopilotController, CommandFlags, ControlState, ControllerConfig, InferenceFallback, Phase,
    TickInput,
};
pub use error::{ConfigError, InferenceError, InputError};
pub use network::{InferenceEngine, NetworkParameters, VelocitySuggestion};
