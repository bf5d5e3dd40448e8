use std::fmt;

// ---------------------------------------------------------------------------
// UploadState
// ---------------------------------------------------------------------------

/// Lifecycle state of one upload session.
///
/// The derived ordering is load-bearing: the session guards compare states
/// (`> Paused`, `>= Cancelled`, ...) exactly as written in the transition
/// table. Transitions are monotonic except for the Uploading ↔ Paused pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UploadState {
    // ---
    /// Created and registered; no chunk has arrived yet.
    Init,

    /// Backing file is open and receiving chunks.
    Uploading,

    /// Client paused; the backing file is closed until the next chunk.
    Paused,

    /// All bytes received; the handover worker owns the session's fate.
    HandingOver,

    /// Cancelled (explicitly, by timeout, or by a failed handover).
    Cancelled,

    /// Backend confirmed pickup; the file is the backend's problem now.
    Finished,

    /// Resources released and the session unregistered. Terminal.
    CleanedUp,
}

// ---

impl UploadState {
    // ---
    /// True once no further chunk, pause, or declaration is legal.
    pub fn past_upload(self) -> bool {
        self > UploadState::Paused
    }

    /// True once the session has reached a cancel-proof point.
    pub fn past_cancel(self) -> bool {
        self >= UploadState::HandingOver
    }
}

// ---

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadState::Init => "init",
            UploadState::Uploading => "uploading",
            UploadState::Paused => "paused",
            UploadState::HandingOver => "handing-over",
            UploadState::Cancelled => "cancelled",
            UploadState::Finished => "finished",
            UploadState::CleanedUp => "cleaned-up",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::UploadState::*;

    // ---

    #[test]
    fn ordering_matches_guard_table() {
        assert!(Init < Uploading);
        assert!(Uploading < Paused);
        assert!(Paused < HandingOver);
        assert!(HandingOver < Cancelled);
        assert!(Cancelled < Finished);
        assert!(Finished < CleanedUp);
    }

    // ---

    #[test]
    fn guard_helpers() {
        assert!(!Paused.past_upload());
        assert!(HandingOver.past_upload());
        assert!(!Paused.past_cancel());
        assert!(HandingOver.past_cancel());
        assert!(Cancelled.past_cancel());
    }
}
