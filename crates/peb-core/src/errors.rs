/// Core error type.
///
/// Adapter crates map their specific errors into this type so the core can
/// apply one failure policy per call site (report to the requester vs
/// log-and-abort).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("markup parse error: {0}")]
    Parse(String),

    #[error("telegram error: {0}")]
    Telegram(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
