//! Callback POSTs to the web-app backend.
//!
//! Both the completion handshake and the cancellation notice are plain HTML
//! form POSTs against the upload's callback URL. The backend answers a
//! completion POST with a bare-word body: `done` if it already took custody
//! of the file, `wait` if the broker should hold the file until the backend
//! confirms pickup out of band. Anything else is a protocol violation.

use std::time::Duration;

use serde::Serialize;
use url::Url;

// ---

use inflow_domain::{InflowError, Result};

// ---------------------------------------------------------------------------
// CallbackForm
// ---------------------------------------------------------------------------

/// Form fields for both callback flavors.
///
/// A completion POST carries `cancelled: "no"` and the stored file's path in
/// `filename`; a cancellation POST carries `cancelled: "yes"`, an empty
/// `filename`, and the reason.
#[derive(Debug, Serialize)]
pub(crate) struct CallbackForm<'a> {
    pub id: &'a str,
    pub filename: &'a str,
    #[serde(rename = "filenameFromBrowser")]
    pub filename_from_browser: &'a str,
    pub secret: &'a str,
    pub cancelled: &'a str,
    #[serde(rename = "cancelReason")]
    pub cancel_reason: &'a str,
}

// ---------------------------------------------------------------------------
// BackendReply
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BackendReply {
    /// Backend took the file during the POST; nothing left to wait for.
    Done,

    /// Backend will fetch the file later and confirm through the admin
    /// surface.
    Wait,
}

// ---------------------------------------------------------------------------
// POST + reply parsing
// ---------------------------------------------------------------------------

/// POST `form` to `url` and return the raw reply body.
///
/// `timeout` of zero means no request deadline.
pub(crate) async fn post_callback(
    http: &reqwest::Client,
    url: &Url,
    form: &CallbackForm<'_>,
    timeout: Duration,
) -> Result<String> {
    let mut request = http.post(url.clone()).form(form);
    if !timeout.is_zero() {
        request = request.timeout(timeout);
    }

    let response = request.send().await.map_err(|e| {
        InflowError::HandoverRequest(format!("request to app backend at {url} failed: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(InflowError::HandoverRequest(format!(
            "app backend answered with status {status}"
        )));
    }

    response
        .text()
        .await
        .map_err(|e| InflowError::HandoverRequest(format!("reading backend reply failed: {e}")))
}

// ---

/// Interpret a completion-POST reply body.
///
/// Only the first four bytes are significant; the backend is free to append
/// whatever it wants after the keyword.
pub(crate) fn parse_reply(body: &str) -> Result<BackendReply> {
    match body.as_bytes().get(..4) {
        Some(b"done") => Ok(BackendReply::Done),
        Some(b"wait") => Ok(BackendReply::Wait),
        _ => Err(InflowError::HandoverReply),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
