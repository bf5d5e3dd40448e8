use std::time::Duration;

use url::Url;

// ---------------------------------------------------------------------------
// DestinationKind
// ---------------------------------------------------------------------------

/// Where a finished upload ends up.
///
/// Local filesystem is the only destination today; the enum exists so that a
/// second storage backend is an added variant, not an interface refactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestinationKind {
    // ---
    #[default]
    LocalFile,
}

// ---------------------------------------------------------------------------
// UploadParams
// ---------------------------------------------------------------------------

/// Immutable per-upload parameters, fixed when the web-app backend requests
/// an upload ticket.
#[derive(Debug, Clone)]
pub struct UploadParams {
    // ---
    pub destination: DestinationKind,

    /// URL the broker POSTs to when the file is complete (or cancelled).
    pub callback_url: Url,

    /// Opaque shared secret echoed back in every callback POST.
    /// Empty string means no secret was configured.
    pub callback_secret: String,

    /// Delete the stored file during cleanup after a successful handover.
    pub remove_after_finish: bool,

    /// Quiet period after which the session cancels itself.
    /// `Duration::ZERO` disables the idle timeout.
    pub idle_timeout: Duration,
}
