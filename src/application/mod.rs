//! Process lifecycle: startup, serving and graceful shutdown
//!
//! This module wires configuration, storage, TLS and the gateway router
//! together and owns the background tasks.

pub mod app;

pub use app::{shutdown_signal, Application};
