//! One upload session: the per-upload state machine and its backing file.
//!
//! # Locking
//!
//! Each session carries two locks with strict roles:
//!
//! - `inner` (async mutex) serializes all data mutation — file handles,
//!   cursor, declared size, binding. It may be held across file I/O awaits.
//! - `state` (std mutex) guards only the [`UploadState`] word. It is taken
//!   for a few instructions at a time and never held across an await.
//!
//! When both are needed, `inner` is taken first. Backend POSTs happen under
//! neither lock.
//!
//! # Handover
//!
//! [`UploadSession::hand_over`] flips the state to `HandingOver` exactly once
//! and spawns a worker that POSTs the completion callback, optionally waits
//! for the backend's pickup confirmation, and publishes the outcome on a
//! watch channel every interested connection handler can observe.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};

// ---

use crate::handover::{self, BackendReply, CallbackForm};
use crate::registry::UploadRegistry;
use crate::timeout::{self, IdleTimer};
use inflow_domain::{InflowError, Result, UploadParams, UploadState};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the handover worker reports back: success, or a printable reason.
///
/// `String` instead of the error type so the outcome is cheaply clonable
/// through the watch channel.
pub type HandoverOutcome = std::result::Result<(), String>;

// ---

/// Mutable session data, all behind the coarse async lock.
#[derive(Debug)]
struct SessionInner {
    /// Whether a connection handler currently owns this session.
    bound: bool,

    /// Open backing file while in Uploading. Closed (None) in every other
    /// state, including Paused.
    file: Option<File>,

    /// Path of the backing file: `<id>.part` while receiving, the bare
    /// `<id>` after completion. None until the first chunk.
    path: Option<PathBuf>,

    /// File name as the browser reported it. Informational only — it never
    /// touches the filesystem.
    browser_name: String,

    declared_size: u64,
    bytes_received: u64,

    last_activity: Instant,

    /// Current quiet period. Zero means the idle timeout is disarmed.
    idle_timeout: Duration,
}

// ---------------------------------------------------------------------------
// UploadSession
// ---------------------------------------------------------------------------

pub struct UploadSession {
    id: String,
    params: UploadParams,
    storage_dir: PathBuf,
    http: reqwest::Client,

    /// Back-reference for self-unregistration during cleanup. Weak so the
    /// registry owning us doesn't cycle.
    registry: Weak<UploadRegistry>,

    state: StdMutex<UploadState>,
    inner: AsyncMutex<SessionInner>,
    timer: IdleTimer,

    created_at: Instant,

    handover_tx: watch::Sender<Option<HandoverOutcome>>,
    handover_rx: watch::Receiver<Option<HandoverOutcome>>,

    /// Pickup-confirmation signal, consumed by the first confirmation.
    /// Created eagerly so a confirmation racing ahead of the worker is
    /// buffered rather than lost.
    confirm_tx: StdMutex<Option<oneshot::Sender<()>>>,
    confirm_rx: AsyncMutex<Option<oneshot::Receiver<()>>>,
}

// ---

impl UploadSession {
    // ---
    /// Build a session and spawn its idle-timeout supervisor.
    pub fn create(
        id: String,
        params: UploadParams,
        storage_dir: PathBuf,
        http: reqwest::Client,
        registry: Weak<UploadRegistry>,
    ) -> Arc<Self> {
        let (timer, timer_rx) = IdleTimer::channel();
        let (handover_tx, handover_rx) = watch::channel(None);
        let (confirm_tx, confirm_rx) = oneshot::channel();
        let idle_timeout = params.idle_timeout;

        let session = Arc::new(Self {
            id,
            params,
            storage_dir,
            http,
            registry,
            state: StdMutex::new(UploadState::Init),
            inner: AsyncMutex::new(SessionInner {
                bound: false,
                file: None,
                path: None,
                browser_name: String::new(),
                declared_size: 0,
                bytes_received: 0,
                last_activity: Instant::now(),
                idle_timeout,
            }),
            timer,
            created_at: Instant::now(),
            handover_tx,
            handover_rx,
            confirm_tx: StdMutex::new(Some(confirm_tx)),
            confirm_rx: AsyncMutex::new(Some(confirm_rx)),
        });

        timeout::spawn(Arc::clone(&session), idle_timeout, timer_rx);
        session
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> UploadState {
        *self.state.lock().expect("state lock poisoned")
    }

    pub fn callback_secret(&self) -> &str {
        &self.params.callback_secret
    }

    pub async fn declared_size(&self) -> u64 {
        self.inner.lock().await.declared_size
    }

    pub async fn bytes_received(&self) -> u64 {
        self.inner.lock().await.bytes_received
    }

    pub async fn browser_name(&self) -> String {
        self.inner.lock().await.browser_name.clone()
    }

    /// Current path of the backing file, if a chunk ever arrived.
    pub async fn stored_path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }

    pub async fn idle_for(&self) -> Duration {
        self.inner.lock().await.last_activity.elapsed()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    // ---------------------------------------------------------------------
    // Binding
    // ---------------------------------------------------------------------

    /// Claim this session for a connection handler. At most one handler may
    /// be bound at a time.
    pub async fn bind_handler(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.bound {
            return Err(InflowError::AlreadyBound);
        }
        inner.bound = true;
        self.touch(&mut inner);
        Ok(())
    }

    // ---

    pub async fn unbind_handler(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.bound {
            return Err(InflowError::NotBound);
        }
        inner.bound = false;
        self.touch(&mut inner);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Declarations
    // ---------------------------------------------------------------------

    /// Fix the total upload size. Only legal before the first chunk.
    pub async fn declare_size(&self, size: u64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if self.state() != UploadState::Init {
            return Err(InflowError::TooLateFor("a size declaration"));
        }
        inner.declared_size = size;
        self.touch(&mut inner);
        Ok(())
    }

    // ---

    /// Record the browser-side file name. Only legal before the first chunk.
    pub async fn declare_file_name(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if self.state() != UploadState::Init {
            return Err(InflowError::TooLateFor("a file name declaration"));
        }
        inner.browser_name = name.to_string();
        self.touch(&mut inner);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Chunk intake
    // ---------------------------------------------------------------------

    /// Append one chunk to the backing file.
    ///
    /// Opens `<id>.part` on the first chunk, reopens and seeks to the end
    /// when resuming from Paused, and on the final byte closes the file and
    /// renames it to its bare ID. A failed write truncates the file back to
    /// the last acknowledged cursor so a retry of the same chunk stays
    /// consistent.
    pub async fn consume_chunk(&self, chunk: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = self.state();
        if state.past_upload() {
            return Err(InflowError::WrongState);
        }

        match state {
            UploadState::Init => {
                let path = self.storage_dir.join(format!("{}.part", self.id));
                let file = File::create(&path).await?;
                inner.file = Some(file);
                inner.path = Some(path);
            }
            UploadState::Paused => {
                let path = match inner.path.clone() {
                    Some(p) => p,
                    None => return Err(InflowError::WrongState),
                };
                let mut file = OpenOptions::new().read(true).write(true).open(&path).await?;
                file.seek(SeekFrom::End(0)).await?;
                inner.file = Some(file);
            }
            _ => {}
        }
        self.set_state(UploadState::Uploading);

        if inner.bytes_received + chunk.len() as u64 > inner.declared_size {
            self.touch(&mut inner);
            return Err(InflowError::SizeExceeded {
                declared: inner.declared_size,
            });
        }

        let cursor = inner.bytes_received;
        let written = {
            let file = match inner.file.as_mut() {
                Some(f) => f,
                None => return Err(InflowError::WrongState),
            };
            match file.write_all(chunk).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    rewind_to_cursor(file, cursor).await;
                    Err(e)
                }
            }
        };
        if let Err(e) = written {
            self.touch(&mut inner);
            return Err(e.into());
        }
        inner.bytes_received = cursor + chunk.len() as u64;

        if inner.bytes_received == inner.declared_size {
            self.finish_file(&mut inner).await?;
        }

        self.touch(&mut inner);
        Ok(())
    }

    // ---

    /// Close the completed `.part` file and rename it to its final name.
    async fn finish_file(&self, inner: &mut SessionInner) -> Result<()> {
        if let Some(mut file) = inner.file.take() {
            file.flush().await?;
        }
        let part = match inner.path.clone() {
            Some(p) => p,
            None => return Ok(()), // zero-length upload, nothing on disk
        };
        let final_path = part.with_extension("");
        tokio::fs::rename(&part, &final_path).await?;
        inner.path = Some(final_path);
        tracing::debug!(id = %self.id, bytes = inner.bytes_received, "upload complete on disk");
        Ok(())
    }

    // ---

    /// Client paused: close the backing file until the next chunk reopens it.
    pub async fn pause(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = self.state();
        if state != UploadState::Uploading && state != UploadState::Paused {
            return Err(InflowError::WrongState);
        }
        self.set_state(UploadState::Paused);
        if let Some(mut file) = inner.file.take() {
            let _ = file.flush().await;
        }
        self.touch(&mut inner);
        tracing::debug!(id = %self.id, at = inner.bytes_received, "upload paused");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Handover
    // ---------------------------------------------------------------------

    /// Start the handover handshake with the web-app backend.
    ///
    /// Idempotent: the first call (with state below `HandingOver`) spawns the
    /// worker; every call returns a receiver for the shared outcome. Poll the
    /// receiver until it holds `Some(outcome)`.
    pub fn hand_over(
        self: &Arc<Self>,
        request_timeout: Duration,
        confirm_timeout: Duration,
    ) -> watch::Receiver<Option<HandoverOutcome>> {
        let rx = self.handover_rx.clone();

        let launch = {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state < UploadState::HandingOver {
                *state = UploadState::HandingOver;
                true
            } else {
                false
            }
        };

        if launch {
            let session = Arc::clone(self);
            tokio::spawn(async move {
                session.run_handover(request_timeout, confirm_timeout).await;
            });
        }
        rx
    }

    // ---

    /// The handover worker. Runs at most once per session.
    async fn run_handover(self: Arc<Self>, request_timeout: Duration, confirm_timeout: Duration) {
        let (path, browser_name) = {
            let mut inner = self.inner.lock().await;
            self.touch(&mut inner);
            (
                inner
                    .path
                    .as_deref()
                    .map(path_to_string)
                    .unwrap_or_default(),
                inner.browser_name.clone(),
            )
        };

        let form = CallbackForm {
            id: &self.id,
            filename: &path,
            filename_from_browser: &browser_name,
            secret: &self.params.callback_secret,
            cancelled: "no",
            cancel_reason: "",
        };
        tracing::info!(id = %self.id, url = %self.params.callback_url, "handing file over to app backend");

        let outcome = match handover::post_callback(
            &self.http,
            &self.params.callback_url,
            &form,
            request_timeout,
        )
        .await
        .and_then(|body| handover::parse_reply(&body))
        {
            Ok(BackendReply::Done) => Ok(()),
            Ok(BackendReply::Wait) => self.await_confirmation(confirm_timeout).await,
            Err(e) => Err(e),
        };
        self.touch_now().await;

        match &outcome {
            Ok(()) => {
                self.set_state(UploadState::Finished);
                tracing::info!(id = %self.id, "handover finished");
            }
            Err(e) => {
                // The renamed file stays on disk for the operator; only the
                // state flips, so cleanup won't mistake this for a regular
                // cancellation with an already-deleted partial.
                self.set_state(UploadState::Cancelled);
                tracing::warn!(id = %self.id, "handover failed: {e}");
            }
        }

        let _ = self
            .handover_tx
            .send(Some(outcome.map_err(|e| e.to_string())));
    }

    // ---

    /// Wait for the backend's pickup confirmation after a `wait` reply.
    async fn await_confirmation(&self, confirm_timeout: Duration) -> Result<()> {
        let rx = self.confirm_rx.lock().await.take();
        let Some(rx) = rx else {
            return Err(InflowError::HandoverConfirmTimeout);
        };
        tracing::debug!(id = %self.id, "backend says wait, holding the file");
        match tokio::time::timeout(confirm_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            // Sender dropped or deadline passed: either way nobody is coming.
            Ok(Err(_)) | Err(_) => Err(InflowError::HandoverConfirmTimeout),
        }
    }

    // ---

    /// Backend confirms it retrieved the file (admin surface).
    pub fn confirm_handover(&self) -> Result<()> {
        if self.state() != UploadState::HandingOver {
            return Err(InflowError::NotHandingOver);
        }
        let tx = self
            .confirm_tx
            .lock()
            .expect("confirm lock poisoned")
            .take()
            .ok_or(InflowError::NoWaitingHandover)?;
        tx.send(()).map_err(|_| InflowError::NoWaitingHandover)
    }

    // ---------------------------------------------------------------------
    // Cancel / cleanup
    // ---------------------------------------------------------------------

    /// Cancel the upload and delete the partial file.
    ///
    /// A second cancel is a no-op success; cancelling at or past
    /// `HandingOver` is refused. The backend notification (when requested)
    /// runs after all locks are dropped — a slow backend can delay the
    /// caller, never resource release.
    pub async fn cancel(
        &self,
        tell_backend: bool,
        reason: &str,
        request_timeout: Duration,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;

        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state == UploadState::Cancelled {
                return Ok(());
            }
            if state.past_cancel() {
                return Err(InflowError::TooLateToCancel);
            }
            *state = UploadState::Cancelled;
        }
        tracing::info!(id = %self.id, %reason, "upload cancelled");

        if let Some(file) = inner.file.take() {
            drop(file);
        }
        if let Some(path) = inner.path.clone() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(id = %self.id, "removing partial file: {e}");
                }
            }
        }
        self.touch(&mut inner);

        if !tell_backend {
            return Ok(());
        }
        let browser_name = inner.browser_name.clone();
        drop(inner);

        let form = CallbackForm {
            id: &self.id,
            filename: "",
            filename_from_browser: &browser_name,
            secret: &self.params.callback_secret,
            cancelled: "yes",
            cancel_reason: reason,
        };
        let result = handover::post_callback(
            &self.http,
            &self.params.callback_url,
            &form,
            request_timeout,
        )
        .await;
        self.touch_now().await;
        result.map(|_| ())
    }

    // ---

    /// Release everything: maybe delete the stored file, unregister, retire
    /// the idle supervisor. Legal only from `Cancelled` or `Finished`;
    /// repeated cleanup is a no-op.
    pub async fn clean_up(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let state = self.state();
        if state == UploadState::CleanedUp {
            return Ok(());
        }
        if state != UploadState::Cancelled && state != UploadState::Finished {
            return Err(InflowError::TooEarlyToCleanUp);
        }

        // A cancelled session already deleted its partial file (or, after a
        // failed handover, deliberately keeps the finished one).
        if self.params.remove_after_finish && state != UploadState::Cancelled {
            if let Some(path) = inner.path.clone() {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(id = %self.id, "removing stored file: {e}");
                    }
                }
            }
        }
        inner.file = None;

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
        self.set_state(UploadState::CleanedUp);
        self.timer.shutdown();
        tracing::info!(id = %self.id, from = %state, "session cleaned up");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Idle timeout
    // ---------------------------------------------------------------------

    /// Change the quiet period and re-arm the timer. Ignored once the
    /// session is past cancellation.
    pub async fn reset_timeout(&self, quiet: Duration) {
        let mut inner = self.inner.lock().await;
        if self.state() >= UploadState::Cancelled {
            return;
        }
        inner.idle_timeout = quiet;
        self.touch(&mut inner);
    }

    // ---

    /// Note activity: advance the activity clock and re-arm the supervisor.
    fn touch(&self, inner: &mut SessionInner) {
        inner.last_activity = Instant::now();
        self.timer.reset(inner.idle_timeout);
    }

    async fn touch_now(&self) {
        let mut inner = self.inner.lock().await;
        self.touch(&mut inner);
    }

    // ---

    fn set_state(&self, state: UploadState) {
        *self.state.lock().expect("state lock poisoned") = state;
    }
}

// ---

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ---

/// Cut the file back to `cursor` and park the write position at the new end,
/// so a retried chunk lands exactly where the failed one began. Best effort:
/// the write error this follows is what the caller reports.
async fn rewind_to_cursor(file: &mut File, cursor: u64) {
    let _ = file.set_len(cursor).await;
    let _ = file.seek(SeekFrom::End(0)).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use url::Url;

    // ---

    fn test_session(dir: &TempDir) -> Arc<UploadSession> {
        let params = UploadParams {
            destination: Default::default(),
            callback_url: Url::parse("http://127.0.0.1:1/callback").unwrap(),
            callback_secret: "hush".into(),
            remove_after_finish: false,
            idle_timeout: Duration::ZERO,
        };
        UploadSession::create(
            "test-upload".into(),
            params,
            dir.path().to_path_buf(),
            reqwest::Client::new(),
            Weak::new(),
        )
    }

    // ---

    #[tokio::test]
    async fn chunks_flow_into_part_file_and_rename_on_completion() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.declare_size(10).await.unwrap();
        session.declare_file_name("notes.txt").await.unwrap();

        session.consume_chunk(b"hello").await.unwrap();
        assert_eq!(session.state(), UploadState::Uploading);
        assert_eq!(session.bytes_received().await, 5);
        assert!(dir.path().join("test-upload.part").exists());

        session.consume_chunk(b"world").await.unwrap();
        assert_eq!(session.bytes_received().await, 10);
        assert!(!dir.path().join("test-upload.part").exists());
        let final_path = dir.path().join("test-upload");
        assert!(final_path.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"helloworld");
    }

    // ---

    #[tokio::test]
    async fn pause_closes_file_and_resume_appends() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.declare_size(6).await.unwrap();

        session.consume_chunk(b"abc").await.unwrap();
        session.pause().await.unwrap();
        assert_eq!(session.state(), UploadState::Paused);

        session.consume_chunk(b"def").await.unwrap();
        assert_eq!(session.state(), UploadState::Uploading);
        assert_eq!(
            std::fs::read(dir.path().join("test-upload")).unwrap(),
            b"abcdef"
        );
    }

    // ---

    #[tokio::test]
    async fn oversized_chunk_rejected_cursor_unchanged() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.declare_size(4).await.unwrap();

        session.consume_chunk(b"ab").await.unwrap();
        let err = session.consume_chunk(b"cdefg").await.unwrap_err();
        assert!(matches!(err, InflowError::SizeExceeded { declared: 4 }));
        assert_eq!(session.bytes_received().await, 2);

        // The declared remainder still fits.
        session.consume_chunk(b"cd").await.unwrap();
        assert_eq!(session.bytes_received().await, 4);
    }

    // ---

    #[tokio::test]
    async fn declarations_rejected_after_first_chunk() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.declare_size(8).await.unwrap();
        session.consume_chunk(b"x").await.unwrap();

        assert!(matches!(
            session.declare_size(9).await,
            Err(InflowError::TooLateFor(_))
        ));
        assert!(matches!(
            session.declare_file_name("late.txt").await,
            Err(InflowError::TooLateFor(_))
        ));
    }

    // ---

    #[tokio::test]
    async fn cancel_removes_partial_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.declare_size(10).await.unwrap();
        session.consume_chunk(b"hello").await.unwrap();

        session.cancel(false, "test", Duration::ZERO).await.unwrap();
        assert_eq!(session.state(), UploadState::Cancelled);
        assert!(!dir.path().join("test-upload.part").exists());

        // Second cancel: no-op success.
        session.cancel(false, "again", Duration::ZERO).await.unwrap();

        // Chunks are refused from here on.
        assert!(matches!(
            session.consume_chunk(b"more").await,
            Err(InflowError::WrongState)
        ));
    }

    // ---

    #[tokio::test]
    async fn cleanup_guards() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.declare_size(10).await.unwrap();
        session.consume_chunk(b"hello").await.unwrap();

        assert!(matches!(
            session.clean_up().await,
            Err(InflowError::TooEarlyToCleanUp)
        ));

        session.cancel(false, "test", Duration::ZERO).await.unwrap();
        session.clean_up().await.unwrap();
        assert_eq!(session.state(), UploadState::CleanedUp);

        // Repeated cleanup is fine.
        session.clean_up().await.unwrap();
    }

    // ---

    #[tokio::test]
    async fn binding_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);

        session.bind_handler().await.unwrap();
        assert!(matches!(
            session.bind_handler().await,
            Err(InflowError::AlreadyBound)
        ));
        session.unbind_handler().await.unwrap();
        assert!(matches!(
            session.unbind_handler().await,
            Err(InflowError::NotBound)
        ));
        session.bind_handler().await.unwrap();
    }

    // ---

    #[tokio::test]
    async fn rewind_discards_the_failed_suffix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial");
        let mut file = File::create(&path).await.unwrap();
        file.write_all(b"helloworld").await.unwrap();

        // As if the second half had failed mid-write.
        rewind_to_cursor(&mut file, 5).await;
        file.write_all(b"WORLD").await.unwrap();
        file.flush().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"helloWORLD");
    }

    // ---

    #[tokio::test]
    async fn session_reports_its_metadata() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.declare_size(10).await.unwrap();
        session.declare_file_name("notes.txt").await.unwrap();
        assert_eq!(session.stored_path().await, None);

        session.consume_chunk(b"hello").await.unwrap();
        assert_eq!(session.browser_name().await, "notes.txt");
        assert_eq!(
            session.stored_path().await,
            Some(dir.path().join("test-upload.part"))
        );
        assert!(session.idle_for().await < Duration::from_secs(5));
        assert!(session.created_at().elapsed() < Duration::from_secs(5));
    }

    // ---

    #[tokio::test]
    async fn shortened_timeout_reaps_a_quiet_session() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.declare_size(8).await.unwrap();
        session.consume_chunk(b"ab").await.unwrap();

        // The ticket disabled the idle timeout; tightening it makes the
        // supervisor reap the now-quiet session on its own.
        session.reset_timeout(Duration::from_millis(50)).await;
        for _ in 0..200 {
            if session.state() == UploadState::CleanedUp {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(session.state(), UploadState::CleanedUp);
        assert!(!dir.path().join("test-upload.part").exists());
    }

    // ---

    #[tokio::test]
    async fn reset_timeout_ignored_once_cancelled() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        session.declare_size(8).await.unwrap();
        session.consume_chunk(b"ab").await.unwrap();
        session.cancel(false, "test", Duration::ZERO).await.unwrap();

        session.reset_timeout(Duration::from_millis(50)).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Had the reset armed the supervisor, it would have cleaned up.
        assert_eq!(session.state(), UploadState::Cancelled);
    }

    // ---

    #[tokio::test]
    async fn confirm_requires_handing_over_state() {
        let dir = TempDir::new().unwrap();
        let session = test_session(&dir);
        assert!(matches!(
            session.confirm_handover(),
            Err(InflowError::NotHandingOver)
        ));
    }
}
