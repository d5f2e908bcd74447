use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("MySQL error: {0}")]
    MysqlError(#[from] mysql::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Bad config error: {0}")]
    BadConfigError(String),

    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
