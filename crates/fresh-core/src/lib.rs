//! fresh-core: embeddable HTTP router
//!
//! Trie-based routing with `{param}` capture, before/after middleware,
//! route groups, a CRUD helper, static file fallback and global response
//! filters. Dispatch is synchronous and transport-agnostic; the optional
//! server runs it behind hyper.
//!
//! ## Features
//! - `server` - Native server with tokio/hyper
//! - `compress` - Gzip filter via flate2

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod group;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod request;
pub mod resource;
pub mod response;
pub mod router;

#[cfg(feature = "server")]
pub mod server;

// Re-exports
pub use config::Config;
pub use context::{Context, Reply};
pub use endpoint::{handler, Endpoint, HandlerFn};
pub use error::{Error, Result};
pub use group::Group;
pub use request::{Method, Request, RequestBuilder};
pub use resource::Resource;
pub use response::{Response, ResponseBuilder, StatusCode};
pub use router::Router;

pub use fresh_router::{InsertError, Segment};

// Middleware re-exports
pub use middleware::{Chain, Cors, CorsConfig, Gzip, GzipConfig};

// Handlers re-exports
pub use handlers::{Message, StaticAssets, WebSocket};

#[cfg(feature = "server")]
pub use server::{ConnectionTracker, Server, ServerConfig, ServerState};
