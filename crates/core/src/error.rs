use std::time::Duration;

pub type Result<T> = eyre::Result<T>;

/// Failures at the payload-fetch boundary. These never cross the pipeline:
/// they are converted into record data (per-artifact or record-level error
/// strings) before the record reaches the sink.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("http: {0}")]
    Http(String),
    #[error("response exceeds size cap of {0} bytes")]
    TooLarge(u64),
}
