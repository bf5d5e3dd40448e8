//! Daemon configuration, parsed from the command line.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Parser)]
#[command(name = "inflow-server", version, about = "Upload broker daemon")]
pub struct Config {
    // ---
    /// Address the websocket upload endpoint listens on.
    #[arg(long, default_value = "0.0.0.0:4000")]
    pub listen: SocketAddr,

    /// Directory where incoming files are staged. Wiped at startup.
    #[arg(long, default_value = "./inflow-storage")]
    pub storage_dir: PathBuf,

    /// Chunk size clients are told to use, in kilobytes.
    #[arg(long, default_value_t = 64)]
    pub chunk_size_kb: u32,

    /// How many chunks a sender may run ahead of acknowledgements.
    #[arg(long, default_value_t = 2)]
    pub send_ahead: u32,

    /// Seconds of client silence before an upload cancels itself.
    /// Zero disables the idle timeout.
    #[arg(long, default_value_t = 300)]
    pub idle_timeout_s: u64,

    /// Per-read/-write deadline on upload connections, in seconds.
    #[arg(long, default_value_t = 60)]
    pub socket_timeout_s: u64,

    /// Deadline for callback POSTs to the web-app backend, in seconds.
    /// Zero means no deadline.
    #[arg(long, default_value_t = 10)]
    pub handover_timeout_s: u64,

    /// How long to hold a finished file waiting for the backend's pickup
    /// confirmation, in seconds.
    #[arg(long, default_value_t = 300)]
    pub handover_confirm_timeout_s: u64,
}

// ---

impl Config {
    // ---
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_s)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_s)
    }

    pub fn handover_timeout(&self) -> Duration {
        Duration::from_secs(self.handover_timeout_s)
    }

    pub fn handover_confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.handover_confirm_timeout_s)
    }
}
