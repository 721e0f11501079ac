use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdError {
    #[error("Identifier is empty")]
    Empty,

    #[error("Identifier contains reserved separator '{0}'")]
    ReservedSeparator(char),

    #[error("Malformed conversation id: {0}")]
    MalformedConversation(String),

    #[error("Invalid message id: {0}")]
    InvalidMessageId(#[from] uuid::Error),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Invalid length for {field}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}
