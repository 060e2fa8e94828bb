use thiserror::Error;

use cotext_core::DocumentId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] cotext_core::Error),
    #[error("local editing is locked")]
    Locked,
    #[error("unknown document: {0}")]
    UnknownDocument(DocumentId),
    #[error("only the host can {0}")]
    NotHost(&'static str),
    #[error("only a client can {0}")]
    NotClient(&'static str),
    #[error("consistency recovery aborted: {0}")]
    RecoveryAborted(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this signals clock desynchronization with a peer, which only consistency
    /// recovery can repair.
    pub fn needs_recovery(&self) -> bool {
        matches!(self, Error::Core(cotext_core::Error::Precondition(_)))
    }
}
