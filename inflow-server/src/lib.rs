//! Upload broker: receives browser uploads over a websocket in bounded
//! chunks, stages them as local files, and hands finished files over to a
//! web-app backend through an HTTP callback handshake.
//!
//! The binary in `main.rs` wires [`Broker`] to a TCP accept loop; the
//! library surface exists so integration tests (and embedders) can drive
//! the same machinery against their own listeners and mock backends.

mod broker;
mod config;
mod handover;
mod protocol;
mod registry;
mod session;
mod timeout;
mod transport;
mod wire;

// ---------------------------------------------------------------------------
// Gateway re-exports
// ---------------------------------------------------------------------------

pub use broker::{init_storage_dir, Broker, CreateUpload};
pub use config::Config;
pub use protocol::handle_connection;
pub use registry::{IdPool, UploadRegistry};
pub use session::{HandoverOutcome, UploadSession};
pub use wire::WireMsg;
