//! HTTP and websocket surface.

pub mod health;
pub mod products;
pub mod request_context;
mod router;
pub mod sessions;
pub mod voice_session;

pub use router::create_router;
