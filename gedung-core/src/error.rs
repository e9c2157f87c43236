use gedung_fetch::FetchError;
use thiserror::Error;

/// Failures that stop a whole run. Per-row problems never end up here; they
/// become labels in the report instead.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to read input spreadsheet: {0}")]
    SpreadsheetError(#[from] calamine::Error),

    #[error("Input workbook has no worksheets")]
    EmptyWorkbook,

    #[error("Input sheet has no 'URL' column")]
    MissingUrlColumn,

    #[error("Failed to write report: {0}")]
    ReportError(#[from] rust_xlsxwriter::XlsxError),

    #[error("Failed to build archive: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    #[error("Failed to walk output area: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Classifier error: {0}")]
    ClassifyError(#[from] ClassifyError),

    #[error("Failed to save image: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Fetcher error: {0}")]
    FetchError(#[from] FetchError),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Unexpected model output shape {0:?}")]
    OutputShape(Vec<usize>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Not logged in")]
    NotAuthenticated,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, RunError>;
