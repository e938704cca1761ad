//! hapticd daemon library: serves the device hub protocol over a Unix socket.
//!
//! Each client connection runs its own [`hapticd_core::HapticServer`].

pub mod error;
pub mod server;

pub use error::{DaemonError, Result};
pub use server::{DaemonOptions, default_socket_path, run, serve};
