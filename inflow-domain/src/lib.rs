//! Core types and errors for the Inflow upload broker.
//!
//! This crate defines the vocabulary of the system. The server crate depends
//! on `inflow-domain` and speaks its types. No implementations live here.
//!
//! # Structure
//!
//! - [`error`]  — [`InflowError`] and [`Result<T>`] alias
//! - [`state`]  — [`UploadState`] lifecycle enum
//! - [`params`] — [`UploadParams`], [`DestinationKind`] creation parameters

mod error;
mod params;
mod state;

// --- error
pub use error::{InflowError, Result};

// --- state
pub use state::UploadState;

// --- params
pub use params::{DestinationKind, UploadParams};
