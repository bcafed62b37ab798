//! Middleware chains and global response filters
//!
//! Route middleware, group middleware and global filters share the
//! controller signature and are stored as ordered [`Chain`]s.

pub mod body_limit;
pub mod compress;
pub mod cors;

// Re-exports for convenience
pub use body_limit::{format_size, BodyLimitConfig};
pub use compress::{Gzip, GzipConfig};
pub use cors::{Cors, CorsConfig};

use crate::endpoint::HandlerFn;
use crate::{Context, Result};
use std::sync::Arc;

/// Ordered list of handlers run one after another
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Vec<HandlerFn>,
}

impl Chain {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn push(&mut self, handler: HandlerFn) {
        self.handlers.push(handler);
    }

    pub(crate) fn insert(&mut self, index: usize, handler: HandlerFn) {
        self.handlers.insert(index, handler);
    }

    /// Put all of `other` in front of this chain
    pub fn prepend(&mut self, other: &Chain) {
        self.handlers.splice(0..0, other.handlers.iter().cloned());
    }

    /// Put all of `other` after this chain
    pub fn extend(&mut self, other: &Chain) {
        self.handlers.extend(other.handlers.iter().cloned());
    }

    /// Whether this exact handler (same allocation) is in the chain
    pub fn contains(&self, handler: &HandlerFn) -> bool {
        self.handlers.iter().any(|h| Arc::ptr_eq(h, handler))
    }

    /// Run in order, stop at the first error
    pub fn run(&self, ctx: &mut Context) -> Result<()> {
        for handler in &self.handlers {
            handler(ctx)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandlerFn> {
        self.handlers.iter()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("len", &self.handlers.len()).finish()
    }
}
