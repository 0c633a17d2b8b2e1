use ndarray::ArrayView1;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MbalError {
    #[error("Input type error: {0}")]
    InputType(String),

    #[error("Dimension mismatch in {what}: expected {expected} values, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Pressure must be greater than zero (got {value} at index {index})")]
    NonPositivePressure { index: usize, value: f64 },

    #[error("Entity '{entity}' contains underground withdrawal values that are not increasing with time (index {index})")]
    OrderingViolation { entity: String, index: usize },

    #[error("Gas withdrawal results in a negative value ({value}) at period {period}; adjust solution gas-oil/water ratio to reflect consistent gas production")]
    PhysicalInconsistency { period: usize, value: f64 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Root finding failed at step {step}: residual {residual_at_best} after {iterations} evaluations")]
    RootFindingFailure {
        step: usize,
        residual_at_best: f64,
        iterations: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for MbalError {
    fn from(err: toml::de::Error) -> Self {
        MbalError::Configuration(err.to_string())
    }
}

pub type MbalResult<T> = Result<T, MbalError>;

/// Rejects empty input and any NaN or infinite entry.
pub(crate) fn ensure_finite(name: &str, values: ArrayView1<'_, f64>) -> MbalResult<()> {
    if values.is_empty() {
        return Err(MbalError::InputType(format!("{name} must not be empty")));
    }
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(MbalError::InputType(format!(
            "{name} contains a non-numeric value at index {index}"
        ))),
        None => Ok(()),
    }
}
