//! Built-in request handlers

pub mod static_files;
pub mod websocket;

pub use static_files::{mime_type, StaticAssets};
pub use websocket::{Message, WebSocket};
