use thiserror::Error;

use crate::message::ValueType;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Format error: {0}")]
    Format(String),

    #[error("Value type mismatch: expected {expected}, got {actual}")]
    ValueType {
        expected: ValueType,
        actual: ValueType,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
