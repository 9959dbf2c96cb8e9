pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`batch_size` must be a positive integer")]
    InvalidBatchSize,

    #[error("total events must be a positive integer (check `rate`, `duration` and `events`)")]
    InvalidTotalEvents,

    #[error("convergence `threshold` must be within (0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("convergence `poll_interval` must be a positive duration")]
    InvalidPollInterval,
}
