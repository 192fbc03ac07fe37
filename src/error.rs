use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamField {
    WeightsInputHidden,
    WeightsHiddenOutput,
    MinInput,
    MaxInput,
    MinOutput,
    MaxOutput,
}

impl fmt::Display for ParamField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WeightsInputHidden => write!(f, "weights_input_hidden"),
            Self::WeightsHiddenOutput => write!(f, "weights_hidden_output"),
            Self::MinInput => write!(f, "min_input"),
            Self::MaxInput => write!(f, "max_input"),
            Self::MinOutput => write!(f, "min_output"),
            Self::MaxOutput => write!(f, "max_output"),
        }
    }
}

/// Rejected network parameters. Construction fails; nothing is padded or truncated.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    RowCountMismatch {
        field: ParamField,
        expected: usize,
        actual: usize,
    },
    ColumnCountMismatch {
        field: ParamField,
        row: usize,
        expected: usize,
        actual: usize,
    },
    BoundLengthMismatch {
        field: ParamField,
        expected: usize,
        actual: usize,
    },
    NonFiniteParameter {
        field: ParamField,
        index: usize,
    },
    Malformed {
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowCountMismatch {
                field,
                expected,
                actual,
            } => write!(f, "{field}: expected {expected} rows, got {actual}"),
            Self::ColumnCountMismatch {
                field,
                row,
                expected,
                actual,
            } => write!(
                f,
                "{field}: row {row} has {actual} columns, expected {expected}"
            ),
            Self::BoundLengthMismatch {
                field,
                expected,
                actual,
            } => write!(f, "{field}: expected {expected} values, got {actual}"),
            Self::NonFiniteParameter { field, index } => {
                write!(f, "{field}: non-finite value at flat index {index}")
            }
            Self::Malformed { reason } => write!(f, "malformed network parameters: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed {
            reason: err.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputField {
    HorizontalOffset,
    VerticalOffset,
    VelocityX,
    VelocityY,
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HorizontalOffset => write!(f, "horizontal_offset"),
            Self::VerticalOffset => write!(f, "vertical_offset"),
            Self::VelocityX => write!(f, "velocity_x"),
            Self::VelocityY => write!(f, "velocity_y"),
        }
    }
}

/// A per-tick value the host should never have sent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputError {
    NonFinite { field: InputField, value: f64 },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite { field, value } => write!(f, "non-finite {field}: {value}"),
        }
    }
}

impl std::error::Error for InputError {}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InferenceError {
    InvalidInput(InputError),
    NonFiniteOutput { dim: usize, value: f64 },
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(err) => write!(f, "inference rejected input: {err}"),
            Self::NonFiniteOutput { dim, value } => {
                write!(f, "network produced non-finite output[{dim}]: {value}")
            }
        }
    }
}

impl std::error::Error for InferenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidInput(err) => Some(err),
            Self::NonFiniteOutput { .. } => None,
        }
    }
}

impl From<InputError> for InferenceError {
    fn from(err: InputError) -> Self {
        Self::InvalidInput(err)
    }
}

pub(crate) fn ensure_finite(field: InputField, value: f64) -> Result<f64, InputError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(InputError::NonFinite { field, value })
    }
}
