//! Error types shared by the samplers, the sweep orchestrator and the chain driver.

use thiserror::Error;

/// Invalid sampler configuration. Mostly raised when an updater is built, before any
/// row is touched; the Row-Gibbs column limit can only be checked per row.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Unknown row sampler '{0}'")]
    UnknownSampler(String),
    #[error("Particle Gibbs needs at least one particle")]
    ZeroParticles,
    #[error("Resample threshold must lie in (0, 1], got {0}")]
    InvalidResampleThreshold(f64),
    #[error(
        "Row Gibbs enumerates 2^m configurations; {num_cols} columns exceeds the \
        limit of {max_cols}"
    )]
    TooManyRowGibbsColumns { num_cols: usize, max_cols: usize },
    #[error("Singleton moves require a nonparametric feature allocation prior")]
    SingletonsRequireNonparametricPrior,
    #[error("Invalid feature allocation prior: {0}")]
    InvalidPrior(String),
}

/// Failure of a single row update, a sweep, or a chain step.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SamplerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Every candidate had zero (or NaN) probability, or weights stopped being finite.
    #[error("Numerical degeneracy: {0}")]
    NumericalDegeneracy(String),
    #[error("Dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Feature probability {prob} for column {col_idx} is outside (0, 1)")]
    InvalidFeatureProbability { col_idx: usize, prob: f64 },
    #[error("Asked for row {row_idx} but there are {num_rows} rows")]
    RowOutOfBounds { row_idx: usize, num_rows: usize },
    #[error("Asked for column {col_idx} but there are {num_features} features")]
    ColumnOutOfBounds { col_idx: usize, num_features: usize },
    #[error("Feature allocation entries must be 0 or 1, found {value} at ({row_idx}, {col_idx})")]
    NonBinaryEntry {
        row_idx: usize,
        col_idx: usize,
        value: i64,
    },
    #[error("The data distribution has no collapsed row likelihood")]
    CollapsedLikelihoodUnavailable,
    #[error("The collapsed likelihood needs fully observed data; row {0} has missing entries")]
    MissingData(usize),
}

/// Invalid input to the chi-square goodness-of-fit test.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ChiSquareError {
    #[error("Expected {expected} observed frequencies, got {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("Need at least two bins, got {0}")]
    TooFewBins(usize),
    #[error("Expected frequencies must be positive, got {0}")]
    NonPositiveExpected(f64),
}
