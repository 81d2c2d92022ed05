use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a download/install session.
///
/// `Cancelled` must reach the caller unchanged; the other kinds are
/// collected at the `prepare_or_notify` boundary and reported through
/// the host notifier.
#[derive(Debug, Error)]
pub enum Error {
    /// Cooperative cancellation via the progress channel.
    #[error("operation cancelled")]
    Cancelled,

    /// Network or HTTP-level failure.
    #[error("download failed: {0}")]
    Transport(String),

    /// The server offered a name the path validator rejects.
    #[error("invalid filename returned by the server: {0:?}")]
    InvalidFilename(String),

    /// The artifact carries a descriptor that cannot be used.
    #[error("bad plugin descriptor in {}: {reason}", .path.display())]
    Descriptor { path: PathBuf, reason: String },

    /// An archive could not be read or extracted.
    #[error("bad archive {}: {reason}", .path.display())]
    Archive { path: PathBuf, reason: String },

    /// Install was requested for a session that never reached the
    /// accepted state.
    #[error("plugin {0}: session was not accepted for install")]
    NotAccepted(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
