//! Route groups
//!
//! A group is a path prefix plus before/after middleware that every route
//! registered through it inherits. Groups nest: the child's prefix is
//! joined onto the parent's and the parent's middleware stays outside the
//! child's.
//!
//! ```
//! use fresh_core::{Context, Method, Request, Router};
//!
//! let mut router = Router::new();
//! let mut api = router.group("/api").before(|ctx: &mut Context| {
//!     ctx.response.header("x-api", "1");
//!     Ok(())
//! });
//! api.get("/ping", |ctx: &mut Context| ctx.response.text(200u16, "pong")).unwrap();
//!
//! let res = router.dispatch(Request::new(Method::Get, "/api/ping"));
//! assert_eq!(res.header("x-api"), Some("1"));
//! ```

use crate::endpoint::{handler, Endpoint, HandlerFn};
use crate::handlers::websocket::{self, WebSocket};
use crate::middleware::Chain;
use crate::resource::Resource;
use crate::{Context, Method, Result, Router};
use fresh_router::path;
use std::path::PathBuf;
use std::sync::Arc;

/// Prefix and middleware scope over a [`Router`]
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
    /// Outermost group first
    before: Chain,
    /// This group's own entries first, then the inherited ones
    after: Chain,
    inherited_after: usize,
}

impl<'r> Group<'r> {
    pub(crate) fn new(router: &'r mut Router, prefix: &str) -> Self {
        Self {
            router,
            prefix: path::join("", prefix),
            before: Chain::new(),
            after: Chain::new(),
            inherited_after: 0,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Nested group; starts from copies of this group's middleware
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            router: &mut *self.router,
            prefix: path::join(&self.prefix, prefix),
            before: self.before.clone(),
            after: self.after.clone(),
            inherited_after: self.after.len(),
        }
    }

    /// Chain a before middleware
    pub fn before<F>(mut self, middleware: F) -> Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.add_before(middleware);
        self
    }

    /// Chain an after middleware
    pub fn after<F>(mut self, middleware: F) -> Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.add_after(middleware);
        self
    }

    pub fn add_before<F>(&mut self, middleware: F) -> &mut Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.before.push(Arc::new(middleware));
        self
    }

    pub fn add_after<F>(&mut self, middleware: F) -> &mut Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        // Own entries run before the inherited tail
        let at = self.after.len() - self.inherited_after;
        self.after.insert(at, Arc::new(middleware));
        self
    }

    /// Register `path` under the group prefix
    pub fn route<F>(&mut self, method: Method, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.register(method, path, handler(controller))
    }

    fn register(
        &mut self,
        method: Method,
        path: &str,
        controller: HandlerFn,
    ) -> Result<&mut Endpoint> {
        let full = path::join(&self.prefix, path);
        let (endpoint, _) = self.router.upsert(method, &full, controller)?;
        endpoint.wrap(&self.before, &self.after);
        Ok(endpoint)
    }

    pub fn get<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Get, path, controller)
    }

    pub fn post<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Post, path, controller)
    }

    pub fn put<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Put, path, controller)
    }

    pub fn patch<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Patch, path, controller)
    }

    pub fn delete<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Delete, path, controller)
    }

    pub fn options<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Options, path, controller)
    }

    pub fn trace<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Trace, path, controller)
    }

    pub fn head<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Head, path, controller)
    }

    /// WebSocket route under the group prefix; group middleware runs
    /// before the handshake
    pub fn ws<F>(&mut self, path: &str, session: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut WebSocket) -> Result<()> + Send + Sync + 'static,
    {
        self.register(Method::Get, path, websocket::handshake(Arc::new(session)))
    }

    /// CRUD routes under the group prefix
    pub fn crud(&mut self, path: &str, resource: Resource) -> Result<()> {
        let base = path::join(&self.prefix, path);
        resource.register(self.router, &base, &self.before, &self.after)
    }

    /// Static mounts are router-wide; the group prefix does not apply
    pub fn statics(&mut self, url_prefix: &str, fs_prefix: impl Into<PathBuf>) -> &mut Self {
        self.router.statics(url_prefix, fs_prefix);
        self
    }
}

impl std::fmt::Debug for Group<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("prefix", &self.prefix)
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}
