use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum InflowError {
    // ---
    /// Chunk write, pause, or size/name declaration attempted after the
    /// upload left the Init/Uploading/Paused band.
    #[error("upload is in no state for this (might be cancelled)")]
    WrongState,

    /// Size or name declaration after the first chunk arrived.
    #[error("too late to call {0}")]
    TooLateFor(&'static str),

    #[error("already bound to a connection handler")]
    AlreadyBound,

    #[error("not bound to any connection handler")]
    NotBound,

    /// The chunk would push the cursor past the declared file size.
    #[error("file would get larger than declared ({declared} bytes)")]
    SizeExceeded { declared: u64 },

    #[error("too late to cancel")]
    TooLateToCancel,

    #[error("too early to clean up")]
    TooEarlyToCleanUp,

    /// Backend callback returned a non-2xx status or failed in transit.
    #[error("handover request failed: {0}")]
    HandoverRequest(String),

    /// Backend callback reply was neither "done" nor "wait".
    #[error("don't understand reply from app backend")]
    HandoverReply,

    #[error("timed out waiting for app backend to retrieve the file")]
    HandoverConfirmTimeout,

    #[error("upload is not in handing-over state")]
    NotHandingOver,

    #[error("no waiting handover routine")]
    NoWaitingHandover,

    #[error("backend secret not given or wrong")]
    SecretMismatch,

    #[error("unknown upload id: {0}")]
    UnknownUpload(String),

    #[error("id not allocated: {0}")]
    IdNotAllocated(String),

    /// Client broke the wire protocol (bad envelope, unexpected message
    /// type for the current phase, size mismatch on rebind).
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ---

pub type Result<T> = std::result::Result<T, InflowError>;
