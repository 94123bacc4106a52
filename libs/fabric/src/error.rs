use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] fimp_core::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Request {0} is already pending")]
    DuplicateRequest(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
