use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to read recording: {0}")]
    Io(#[from] std::io::Error),
    #[error("column length mismatch: expected {expected} rows, got {actual}")]
    ColumnMismatch { expected: usize, actual: usize },
    #[error("expected 5 or 7 data columns, got {0}")]
    UnexpectedColumnCount(usize),
    #[error("file contains no data rows")]
    EmptyRecording,
    #[error("could not infer a positive sweep count from the header layout")]
    NoSweeps,
    #[error("{rows} data rows cannot be split into {sweeps} equal sweeps")]
    UnevenSweeps { rows: usize, sweeps: usize },
    #[error("no such sweep {sweep}; recording has {available}")]
    SweepOutOfRange { sweep: usize, available: usize },
    #[error("window must satisfy start < end, got [{start_ms}, {end_ms})")]
    InvalidWindow { start_ms: f64, end_ms: f64 },
    #[error("window [{start_ms}, {end_ms}) catches no samples in sweep {sweep}")]
    EmptyWindow {
        start_ms: f64,
        end_ms: f64,
        sweep: usize,
    },
    #[error("invalid fit input: {0}")]
    FitInput(String),
    #[error("normalizing statistic is zero across all sweeps")]
    ZeroNormalizer,
    #[error("histogram needs {0}")]
    Histogram(String),
    #[error("failed to render plot: {0}")]
    Plot(String),
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for AnalysisError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        AnalysisError::Plot(format!("{value:?}"))
    }
}

impl From<image::ImageError> for AnalysisError {
    fn from(value: image::ImageError) -> Self {
        AnalysisError::Plot(value.to_string())
    }
}
