//! HTTP/WebSocket edge and dual-path orchestrator for the salescoach
//! backend. The binary in `main.rs` wires [`context::AppContext`] from the
//! environment and serves [`http::router`].

pub mod channels;
pub mod config;
pub mod context;
pub mod http;
pub mod orchestrator;
pub mod ws;
