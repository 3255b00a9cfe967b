use std::io;
use std::path::PathBuf;

use thiserror::Error;

use tern_huffman::HuffmanError;
use tern_protocol::TransferError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid file name {0:?}")]
    InvalidName(String),

    #[error("local file {} not found", .0.display())]
    MissingLocalFile(PathBuf),

    #[error("invalid {key}={value:?}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("cannot resolve server address {0:?}")]
    UnresolvedServer(String),

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("compression failed: {0}")]
    Compression(#[from] HuffmanError),

    #[error("local I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
