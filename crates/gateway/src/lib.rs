//! Gateway: HTTP + WebSocket server for consultation chat.
//!
//! Lifecycle:
//! 1. Load config, resolve the optional shared token
//! 2. Open the message store and upload directory
//! 3. Start HTTP server (health, history, uploads)
//! 4. Attach WebSocket upgrade handler
//!
//! Chat semantics (join, send, replay) live in `chat.rs`; room membership in
//! `rooms.rs`; outbound fan-out in `broadcast.rs`.

pub mod auth;
pub mod broadcast;
pub mod chat;
pub mod rooms;
pub mod server;
pub mod state;
pub mod upload;
pub mod ws;

pub use {
    chat::{ChatService, IngestError},
    server::{build_gateway_app, start_gateway},
    state::GatewayState,
};
