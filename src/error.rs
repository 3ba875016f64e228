use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("config: {0}")]
    Config(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("format: {0}")]
    Format(String),
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
    #[error("manifest: {0}")]
    Manifest(String),
    #[error("wal replay: {0}")]
    Replay(String),
    #[error("key not found")]
    NotFound,
}

pub type DbResult<T> = std::result::Result<T, DbError>;
