//! HTTP/WebSocket server for nbintel.
//!
//! The I/O shim around the orchestration core: a WebSocket session per
//! client multiplexing concurrent chat responses, wire translation of
//! response events, and the capabilities/config HTTP surface.

pub mod emitter;
pub mod routes;
pub mod session;
pub mod state;
pub mod ws;

pub use emitter::WsResponseEmitter;
pub use routes::router;
pub use session::ChatSession;
pub use state::AppState;
