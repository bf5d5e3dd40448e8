//! The broker: registry, config, and the admin-facing operations the
//! web-app backend drives (create, cancel, confirm).
//!
//! Connection handlers borrow the broker for config and registry lookups;
//! everything session-lifecycle-shaped funnels through here so the secret
//! check sits in exactly one place.

use std::path::Path;
use std::sync::Arc;

use url::Url;

// ---

use crate::config::Config;
use crate::registry::UploadRegistry;
use crate::session::UploadSession;
use inflow_domain::{DestinationKind, InflowError, Result, UploadParams};

// ---------------------------------------------------------------------------
// CreateUpload
// ---------------------------------------------------------------------------

/// What the web-app backend supplies when requesting an upload ticket.
#[derive(Debug, Clone)]
pub struct CreateUpload {
    pub destination: DestinationKind,

    /// Where the completion/cancellation callbacks go.
    pub callback_url: Url,

    /// Shared secret echoed in callbacks and required on admin operations.
    pub callback_secret: String,

    /// Delete the stored file once the backend confirms pickup.
    pub remove_after_finish: bool,
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

pub struct Broker {
    pub config: Config,
    pub registry: Arc<UploadRegistry>,
    http: reqwest::Client,
}

// ---

impl Broker {
    // ---
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Arc::new(UploadRegistry::new()),
            http: reqwest::Client::new(),
        }
    }

    // ---

    /// Create and register a fresh upload session, returning it (the ID is
    /// `session.id()`).
    pub fn create_upload(&self, req: CreateUpload) -> Arc<UploadSession> {
        let id = self.registry.allocate_id();
        let params = UploadParams {
            destination: req.destination,
            callback_url: req.callback_url,
            callback_secret: req.callback_secret,
            remove_after_finish: req.remove_after_finish,
            idle_timeout: self.config.idle_timeout(),
        };
        let session = UploadSession::create(
            id,
            params,
            self.config.storage_dir.clone(),
            self.http.clone(),
            Arc::downgrade(&self.registry),
        );
        self.registry.insert(Arc::clone(&session));
        tracing::info!(id = %session.id(), "upload created");
        session
    }

    // ---

    /// Cancel an upload on the backend's behalf. No cancellation callback is
    /// sent — the backend asked, it already knows.
    pub async fn cancel_upload(&self, id: &str, secret: &str) -> Result<()> {
        let session = self.lookup(id, secret)?;
        session
            .cancel(false, "cancelled by request", self.config.handover_timeout())
            .await?;
        session.clean_up().await
    }

    // ---

    /// Backend confirms it picked up a handed-over file.
    pub async fn confirm_finish(&self, id: &str, secret: &str) -> Result<()> {
        let session = self.lookup(id, secret)?;
        session.confirm_handover()
    }

    // ---

    fn lookup(&self, id: &str, secret: &str) -> Result<Arc<UploadSession>> {
        let session = self
            .registry
            .get(id)
            .ok_or_else(|| InflowError::UnknownUpload(id.to_string()))?;
        if session.callback_secret() != secret {
            return Err(InflowError::SecretMismatch);
        }
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// Storage dir
// ---------------------------------------------------------------------------

/// Wipe and recreate the staging directory. Leftover partials from a
/// previous run belong to sessions that no longer exist.
pub async fn init_storage_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    tracing::info!(dir = %dir.display(), "storage directory ready");
    Ok(())
}
