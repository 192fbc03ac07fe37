//! Fixed-topology feedforward network: 2 inputs, 4 sigmoid hidden units, 2 linear outputs.
//!
//! Inputs are the signed distance to the landing pad; outputs are the velocity
//! the network suggests for that position. Both sides are min-max normalised
//! with per-dimension bounds fitted alongside the weights.

use crate::constants::*;
use crate::error::{ensure_finite, ConfigError, InferenceError, InputField, ParamField};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Serialised form of the network. Matrices are row-major, one row per destination unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkParameters {
    pub weights_input_hidden: Vec<Vec<f64>>,
    pub weights_hidden_output: Vec<Vec<f64>>,
    pub min_input: Vec<f64>,
    pub max_input: Vec<f64>,
    pub min_output: Vec<f64>,
    pub max_output: Vec<f64>,
}

impl NetworkParameters {
    pub fn pretrained() -> Self {
        Self {
            weights_input_hidden: WEIGHTS_INPUT_HIDDEN
                .iter()
                .map(|row| row.to_vec())
                .collect(),
            weights_hidden_output: WEIGHTS_HIDDEN_OUTPUT
                .iter()
                .map(|row| row.to_vec())
                .collect(),
            min_input: MIN_INPUT.to_vec(),
            max_input: MAX_INPUT.to_vec(),
            min_output: MIN_OUTPUT.to_vec(),
            max_output: MAX_OUTPUT.to_vec(),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_slice(bytes)?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("failed reading network parameters {}", path.display()))?;
        Self::from_json(&bytes)
            .with_context(|| format!("invalid network parameters in {}", path.display()))
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating directory {}", parent.display()))?;
        }
        let encoded = serde_json::to_vec_pretty(self)?;
        fs::write(path, encoded).with_context(|| format!("failed writing {}", path.display()))
    }

    /// Checks every matrix and bound vector against the fixed layer widths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        matrix_shape(
            ParamField::WeightsInputHidden,
            &self.weights_input_hidden,
            HIDDEN_WIDTH,
            INPUT_WIDTH,
        )?;
        matrix_shape(
            ParamField::WeightsHiddenOutput,
            &self.weights_hidden_output,
            OUTPUT_WIDTH,
            HIDDEN_WIDTH,
        )?;
        bound_shape(ParamField::MinInput, &self.min_input, INPUT_WIDTH)?;
        bound_shape(ParamField::MaxInput, &self.max_input, INPUT_WIDTH)?;
        bound_shape(ParamField::MinOutput, &self.min_output, OUTPUT_WIDTH)?;
        bound_shape(ParamField::MaxOutput, &self.max_output, OUTPUT_WIDTH)?;
        Ok(())
    }
}

impl Default for NetworkParameters {
    fn default() -> Self {
        Self::pretrained()
    }
}

fn matrix_shape(
    field: ParamField,
    matrix: &[Vec<f64>],
    rows: usize,
    cols: usize,
) -> Result<(), ConfigError> {
    if matrix.len() != rows {
        return Err(ConfigError::RowCountMismatch {
            field,
            expected: rows,
            actual: matrix.len(),
        });
    }
    for (row_idx, row) in matrix.iter().enumerate() {
        if row.len() != cols {
            return Err(ConfigError::ColumnCountMismatch {
                field,
                row: row_idx,
                expected: cols,
                actual: row.len(),
            });
        }
        if let Some(col) = row.iter().position(|value| !value.is_finite()) {
            return Err(ConfigError::NonFiniteParameter {
                field,
                index: row_idx * cols + col,
            });
        }
    }
    Ok(())
}

fn bound_shape(field: ParamField, values: &[f64], len: usize) -> Result<(), ConfigError> {
    if values.len() != len {
        return Err(ConfigError::BoundLengthMismatch {
            field,
            expected: len,
            actual: values.len(),
        });
    }
    if let Some(index) = values.iter().position(|value| !value.is_finite()) {
        return Err(ConfigError::NonFiniteParameter { field, index });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct VelocitySuggestion {
    pub vx: f64,
    pub vy: f64,
}

/// Maps `value` into `[0, 1]` for in-range inputs. A collapsed range maps to `0.0`.
#[inline]
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max == min {
        return 0.0;
    }
    (value - min) / (max - min)
}

#[inline]
pub fn denormalize(normalized: f64, min: f64, max: f64) -> f64 {
    normalized * (max - min) + min
}

/// Logistic activation with slope `SIGMOID_LAMBDA`, clamped exactly outside +/-100.
#[inline]
pub fn sigmoid(v: f64) -> f64 {
    if v > SIGMOID_SATURATION {
        1.0
    } else if v < -SIGMOID_SATURATION {
        0.0
    } else {
        1.0 / (1.0 + (-SIGMOID_LAMBDA * v).exp())
    }
}

fn layer<const IN: usize, const OUT: usize>(
    input: &[f64; IN],
    weights: &[[f64; IN]; OUT],
) -> [f64; OUT] {
    let mut out = [0.0; OUT];
    for (unit, row) in out.iter_mut().zip(weights) {
        let mut acc = 0.0;
        for (x, w) in input.iter().zip(row) {
            acc += x * w;
        }
        *unit = acc;
    }
    out
}

/// Holds validated parameters in fixed-size form. Immutable after construction,
/// so a shared reference can be used from any number of threads.
#[derive(Clone, Debug)]
pub struct InferenceEngine {
    weights_input_hidden: [[f64; INPUT_WIDTH]; HIDDEN_WIDTH],
    weights_hidden_output: [[f64; HIDDEN_WIDTH]; OUTPUT_WIDTH],
    min_input: [f64; INPUT_WIDTH],
    max_input: [f64; INPUT_WIDTH],
    min_output: [f64; OUTPUT_WIDTH],
    max_output: [f64; OUTPUT_WIDTH],
}

impl InferenceEngine {
    pub fn new(params: &NetworkParameters) -> Result<Self, ConfigError> {
        params.validate()?;

        let mut weights_input_hidden = [[0.0; INPUT_WIDTH]; HIDDEN_WIDTH];
        for (dst, src) in weights_input_hidden
            .iter_mut()
            .zip(&params.weights_input_hidden)
        {
            dst.copy_from_slice(src);
        }
        let mut weights_hidden_output = [[0.0; HIDDEN_WIDTH]; OUTPUT_WIDTH];
        for (dst, src) in weights_hidden_output
            .iter_mut()
            .zip(&params.weights_hidden_output)
        {
            dst.copy_from_slice(src);
        }

        let mut engine = Self {
            weights_input_hidden,
            weights_hidden_output,
            min_input: [0.0; INPUT_WIDTH],
            max_input: [0.0; INPUT_WIDTH],
            min_output: [0.0; OUTPUT_WIDTH],
            max_output: [0.0; OUTPUT_WIDTH],
        };
        engine.min_input.copy_from_slice(&params.min_input);
        engine.max_input.copy_from_slice(&params.max_input);
        engine.min_output.copy_from_slice(&params.min_output);
        engine.max_output.copy_from_slice(&params.max_output);

        for dim in 0..INPUT_WIDTH {
            if engine.min_input[dim] == engine.max_input[dim] {
                tracing::debug!(dim, "degenerate input bounds; dimension normalises to 0.0");
            }
        }
        Ok(engine)
    }

    pub fn pretrained() -> Self {
        Self {
            weights_input_hidden: WEIGHTS_INPUT_HIDDEN,
            weights_hidden_output: WEIGHTS_HIDDEN_OUTPUT,
            min_input: MIN_INPUT,
            max_input: MAX_INPUT,
            min_output: MIN_OUTPUT,
            max_output: MAX_OUTPUT,
        }
    }

    pub fn parameters(&self) -> NetworkParameters {
        NetworkParameters {
            weights_input_hidden: self
                .weights_input_hidden
                .iter()
                .map(|r| r.to_vec())
                .collect(),
            weights_hidden_output: self
                .weights_hidden_output
                .iter()
                .map(|r| r.to_vec())
                .collect(),
            min_input: self.min_input.to_vec(),
            max_input: self.max_input.to_vec(),
            min_output: self.min_output.to_vec(),
            max_output: self.max_output.to_vec(),
        }
    }

    pub fn hidden_activations(&self, normalized: &[f64; INPUT_WIDTH]) -> [f64; HIDDEN_WIDTH] {
        layer(normalized, &self.weights_input_hidden).map(sigmoid)
    }

    pub fn predict(
        &self,
        horizontal_distance: f64,
        vertical_distance: f64,
    ) -> Result<VelocitySuggestion, InferenceError> {
        ensure_finite(InputField::HorizontalOffset, horizontal_distance)?;
        ensure_finite(InputField::VerticalOffset, vertical_distance)?;

        let raw = [horizontal_distance, vertical_distance];
        let mut normalized = [0.0; INPUT_WIDTH];
        for dim in 0..INPUT_WIDTH {
            normalized[dim] = normalize(raw[dim], self.min_input[dim], self.max_input[dim]);
        }

        let hidden = self.hidden_activations(&normalized);
        let output = layer(&hidden, &self.weights_hidden_output);

        let mut velocity = [0.0; OUTPUT_WIDTH];
        for dim in 0..OUTPUT_WIDTH {
            let value = denormalize(output[dim], self.min_output[dim], self.max_output[dim]);
            if !value.is_finite() {
                return Err(InferenceError::NonFiniteOutput { dim, value });
            }
            velocity[dim] = value;
        }

        Ok(VelocitySuggestion {
            vx: velocity[0],
            vy: velocity[1],
        })
    }
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self::pretrained()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn pretrained_engine_matches_reference_outputs() {
        let engine = InferenceEngine::pretrained();
        let cases = [
            (0.0, 250.0, 4.448605451407902, -0.07013219259498982),
            (0.0, 10.0, 12.103648692650541, 0.45749842379107086),
            (-300.0, 400.0, 0.13006120584079195, -1.9959182952120407),
            (200.0, 180.0, 6.502417941002925, -0.18338083139201533),
        ];
        for (x, y, vx, vy) in cases {
            let s = engine.predict(x, y).unwrap();
            assert!(close(s.vx, vx), "vx for ({x}, {y}): {}", s.vx);
            assert!(close(s.vy, vy), "vy for ({x}, {y}): {}", s.vy);
        }
    }

    #[test]
    fn engine_from_pretrained_parameters_matches_builtin() {
        let params = NetworkParameters::pretrained();
        let loaded = InferenceEngine::new(&params).unwrap();
        let builtin = InferenceEngine::pretrained();
        for (x, y) in [(12.5, 90.0), (-480.0, 700.0), (0.0, 0.0)] {
            assert_eq!(
                loaded.predict(x, y).unwrap(),
                builtin.predict(x, y).unwrap()
            );
        }
    }

    #[test]
    fn normalize_then_denormalize_recovers_value() {
        let (min, max) = (MIN_INPUT[1], MAX_INPUT[1]);
        for value in [66.0, 120.5, 400.0, 749.0] {
            let back = denormalize(normalize(value, min, max), min, max);
            assert!((back - value).abs() < 1e-9, "{value} -> {back}");
        }
    }

    #[test]
    fn normalize_collapsed_range_is_zero() {
        assert_eq!(normalize(42.0, 3.0, 3.0), 0.0);
        assert_eq!(normalize(-1e9, 0.0, 0.0), 0.0);
    }

    #[test]
    fn sigmoid_saturates_and_stays_bounded() {
        assert_eq!(sigmoid(100.5), 1.0);
        assert_eq!(sigmoid(1e300), 1.0);
        assert_eq!(sigmoid(-100.5), 0.0);
        assert_eq!(sigmoid(-1e300), 0.0);
        assert_eq!(sigmoid(0.0), 0.5);
        for v in [-100.0, -37.0, -1.0, 0.25, 7.5, 100.0] {
            let s = sigmoid(v);
            assert!((0.0..=1.0).contains(&s), "sigmoid({v}) = {s}");
        }
    }

    #[test]
    fn degenerate_input_bounds_do_not_fail() {
        let mut params = NetworkParameters::pretrained();
        params.min_input[0] = 5.0;
        params.max_input[0] = 5.0;
        let engine = InferenceEngine::new(&params).unwrap();

        // The horizontal input no longer matters: every value normalises to 0.0.
        let a = engine.predict(-300.0, 200.0).unwrap();
        let b = engine.predict(450.0, 200.0).unwrap();
        assert_eq!(a, b);

        let hidden =
            engine.hidden_activations(&[0.0, normalize(200.0, MIN_INPUT[1], MAX_INPUT[1])]);
        let out = layer(&hidden, &WEIGHTS_HIDDEN_OUTPUT);
        assert!(close(a.vx, denormalize(out[0], MIN_OUTPUT[0], MAX_OUTPUT[0])));
    }

    #[test]
    fn predict_is_deterministic() {
        let engine = InferenceEngine::pretrained();
        let first = engine.predict(-73.25, 311.0).unwrap();
        let second = engine.predict(-73.25, 311.0).unwrap();
        assert_eq!(first.vx.to_bits(), second.vx.to_bits());
        assert_eq!(first.vy.to_bits(), second.vy.to_bits());
    }

    #[test]
    fn predict_rejects_non_finite_distances() {
        let engine = InferenceEngine::pretrained();
        assert!(matches!(
            engine.predict(f64::NAN, 10.0),
            Err(InferenceError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.predict(10.0, f64::INFINITY),
            Err(InferenceError::InvalidInput(_))
        ));
    }

    #[test]
    fn predict_reports_overflowing_output() {
        let mut params = NetworkParameters::pretrained();
        params.weights_hidden_output[0] = vec![f64::MAX; HIDDEN_WIDTH];
        let engine = InferenceEngine::new(&params).unwrap();
        let err = engine.predict(0.0, 300.0).unwrap_err();
        assert!(matches!(err, InferenceError::NonFiniteOutput { dim: 0, .. }));
    }

    #[test]
    fn validate_rejects_wrong_hidden_width() {
        let mut params = NetworkParameters::pretrained();
        params.weights_input_hidden.pop();
        assert_eq!(
            params.validate(),
            Err(ConfigError::RowCountMismatch {
                field: ParamField::WeightsInputHidden,
                expected: HIDDEN_WIDTH,
                actual: HIDDEN_WIDTH - 1,
            })
        );
        assert!(InferenceEngine::new(&params).is_err());
    }

    #[test]
    fn validate_rejects_ragged_rows_and_short_bounds() {
        let mut params = NetworkParameters::pretrained();
        params.weights_hidden_output[1].push(0.0);
        assert_eq!(
            params.validate(),
            Err(ConfigError::ColumnCountMismatch {
                field: ParamField::WeightsHiddenOutput,
                row: 1,
                expected: HIDDEN_WIDTH,
                actual: HIDDEN_WIDTH + 1,
            })
        );

        let mut params = NetworkParameters::pretrained();
        params.max_output = vec![1.0];
        assert!(matches!(
            params.validate(),
            Err(ConfigError::BoundLengthMismatch {
                field: ParamField::MaxOutput,
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_non_finite_weights() {
        let mut params = NetworkParameters::pretrained();
        params.weights_input_hidden[2][1] = f64::NAN;
        assert_eq!(
            params.validate(),
            Err(ConfigError::NonFiniteParameter {
                field: ParamField::WeightsInputHidden,
                index: 5,
            })
        );
    }

    #[test]
    fn from_json_reports_malformed_documents() {
        assert!(matches!(
            NetworkParameters::from_json(b"{\"weights_input_hidden\": 3}"),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn json_parameters_keep_every_bit() {
        let params = NetworkParameters::pretrained();
        let encoded = serde_json::to_vec_pretty(&params).unwrap();
        let decoded = NetworkParameters::from_json(&encoded).unwrap();

        // 1.2016780567776761 is one of the values that drifts by an ulp without exact parsing.
        assert_eq!(
            decoded.weights_input_hidden[0][1].to_bits(),
            1.2016780567776761f64.to_bits()
        );
        let matrices = [
            (&params.weights_input_hidden, &decoded.weights_input_hidden),
            (&params.weights_hidden_output, &decoded.weights_hidden_output),
        ];
        for (expected, actual) in matrices {
            for (want, got) in expected.iter().flatten().zip(actual.iter().flatten()) {
                assert_eq!(want.to_bits(), got.to_bits(), "{want} decoded as {got}");
            }
        }
        let bounds = [
            (&params.min_input, &decoded.min_input),
            (&params.max_input, &decoded.max_input),
            (&params.min_output, &decoded.min_output),
            (&params.max_output, &decoded.max_output),
        ];
        for (expected, actual) in bounds {
            for (want, got) in expected.iter().zip(actual) {
                assert_eq!(want.to_bits(), got.to_bits(), "{want} decoded as {got}");
            }
        }
    }
}
