//! Route registration and request dispatch
//!
//! Routes live in a [`fresh_router::Tree`] keyed by path segment, with one
//! [`Endpoint`] per (node, method). Dispatch is synchronous: match, build a
//! [`Context`], run the endpoint chain and the global filters, commit.
//!
//! ```
//! use fresh_core::{Context, Method, Request, Router, StatusCode};
//!
//! let mut router = Router::new();
//! router
//!     .get("/first/{a}/second/{b}", |ctx: &mut Context| {
//!         let body = format!("{}-{}", ctx.param("a").unwrap_or(""), ctx.param("b").unwrap_or(""));
//!         ctx.response.text(200u16, body)
//!     })
//!     .unwrap();
//!
//! let res = router.dispatch(Request::new(Method::Get, "/first/42/second/7"));
//! assert_eq!(res.status, StatusCode::OK);
//! assert_eq!(res.body_string().as_deref(), Some("42-7"));
//! ```

use crate::context::Reply;
use crate::endpoint::{handler, Endpoint, HandlerFn};
use crate::group::Group;
use crate::handlers::websocket::{self, WebSocket};
use crate::handlers::StaticAssets;
use crate::middleware::Chain;
use crate::resource::Resource;
use crate::{Context, Error, Method, Request, Response, Result, StatusCode};
use fresh_router::{Node, RouteInfo, Tree};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// HTTP router
pub struct Router {
    tree: Tree<Endpoint>,
    statics: StaticAssets,
    filters: Chain,
    auto_options: bool,
}

impl Router {
    pub fn new() -> Self {
        Self {
            tree: Tree::new(),
            statics: StaticAssets::new(),
            filters: Chain::new(),
            auto_options: false,
        }
    }

    /// Register a controller for `method` on `path`
    ///
    /// Registering the same pair again replaces the controller and keeps
    /// the middleware already attached to it.
    pub fn route<F>(&mut self, method: Method, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.upsert(method, path, handler(controller))
            .map(|(endpoint, _)| endpoint)
    }

    /// Insert or replace; the flag is true when the endpoint is new
    pub(crate) fn upsert(
        &mut self,
        method: Method,
        path: &str,
        controller: HandlerFn,
    ) -> Result<(&mut Endpoint, bool)> {
        let mut created = false;
        let fallback = controller.clone();
        let endpoint = self.tree.insert_with(method.as_str(), path, || {
            created = true;
            Endpoint::new(method, fallback)
        })?;
        if !created {
            endpoint.set_controller(controller);
        }
        debug!(method = %method, path, replaced = !created, "route registered");
        Ok((endpoint, created))
    }

    /// Add a GET route
    pub fn get<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Get, path, controller)
    }

    /// Add a POST route
    pub fn post<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Post, path, controller)
    }

    /// Add a PUT route
    pub fn put<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Put, path, controller)
    }

    /// Add a PATCH route
    pub fn patch<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Patch, path, controller)
    }

    /// Add a DELETE route
    pub fn delete<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Delete, path, controller)
    }

    /// Add an OPTIONS route
    pub fn options<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Options, path, controller)
    }

    /// Add a TRACE route
    pub fn trace<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Trace, path, controller)
    }

    /// Add a HEAD route
    pub fn head<F>(&mut self, path: &str, controller: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.route(Method::Head, path, controller)
    }

    /// WebSocket route: GET `path`, upgraded and handed to `session`
    ///
    /// Middleware attached to the returned endpoint runs before the
    /// handshake, so it can refuse the upgrade.
    pub fn ws<F>(&mut self, path: &str, session: F) -> Result<&mut Endpoint>
    where
        F: Fn(&mut WebSocket) -> Result<()> + Send + Sync + 'static,
    {
        self.upsert(Method::Get, path, websocket::handshake(Arc::new(session)))
            .map(|(endpoint, _)| endpoint)
    }

    /// Route group under `prefix`
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group::new(self, prefix)
    }

    /// Register the CRUD routes of `resource` on `path`
    pub fn crud(&mut self, path: &str, resource: Resource) -> Result<()> {
        resource.register(self, path, &Chain::new(), &Chain::new())
    }

    /// Serve files under `fs_prefix` for requests below `url_prefix`
    pub fn statics(&mut self, url_prefix: &str, fs_prefix: impl Into<PathBuf>) -> &mut Self {
        self.statics.mount(url_prefix, fs_prefix);
        self
    }

    /// Add a directory default file (`index.html` is preset)
    pub fn default_file(&mut self, name: impl Into<String>) -> &mut Self {
        self.statics.add_default(name);
        self
    }

    /// Replace the directory default files
    pub fn default_files<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statics.set_defaults(names);
        self
    }

    /// Add a global filter, run after every successful chain
    pub fn filter<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.add_filter(handler(filter))
    }

    pub fn add_filter(&mut self, filter: HandlerFn) -> &mut Self {
        self.filters.push(filter);
        self
    }

    /// Answer OPTIONS for every matched path with `204` and `Allow`
    pub fn auto_options(&mut self, enabled: bool) -> &mut Self {
        self.auto_options = enabled;
        self
    }

    pub fn tree(&self) -> &Tree<Endpoint> {
        &self.tree
    }

    /// Every registered route, sorted by pattern then method
    pub fn routes(&self) -> Vec<RouteInfo<'_, Endpoint>> {
        self.tree.routes()
    }

    /// Log the route table
    pub fn print_routes(&self) {
        let routes = self.routes();
        for route in &routes {
            let (before, after) = route.value.middleware_len();
            info!(method = route.method, path = %route.pattern, before, after, "route");
        }
        info!(count = routes.len(), "routes registered");
    }

    /// Handle one request
    ///
    /// Never panics; a panicking controller or middleware yields a 500.
    pub fn dispatch(&self, req: Request) -> Response {
        let started = Instant::now();
        let method = req.method;
        let path = req.path.clone();

        let res = match panic::catch_unwind(AssertUnwindSafe(move || self.handle(req))) {
            Ok(res) => res,
            Err(payload) => error_response(
                &Error::Panic(panic_message(payload)),
                Reply::new(),
                method == Method::Head,
            ),
        };

        debug!(
            method = %method,
            path = %path,
            status = res.status.as_u16(),
            elapsed = ?started.elapsed(),
            "dispatch"
        );
        res
    }

    fn handle(&self, req: Request) -> Response {
        let head = req.method == Method::Head;

        let found = match self.tree.find(&req.path) {
            Some(found) if found.node.has_handlers() => found,
            _ => return self.fallback(req),
        };

        let endpoint = found
            .handler(req.method.as_str())
            .or_else(|| if head { found.handler("GET") } else { None });

        let endpoint = match endpoint {
            Some(endpoint) => endpoint,
            None => {
                let allow = self.allowed(found.node);
                let allow: Vec<&str> = allow.iter().map(String::as_str).collect();
                if req.method == Method::Options && self.auto_options {
                    return self.preflight(req, &allow);
                }
                warn!(method = %req.method, path = %req.path, "method not allowed");
                return Response::method_not_allowed(&allow);
            }
        };

        let mut ctx = Context::with_params(req, found.params_map());
        match self.run(endpoint, &mut ctx) {
            Ok(()) => ctx.response.commit(head),
            Err(e) => error_response(&e, ctx.response, head),
        }
    }

    fn run(&self, endpoint: &Endpoint, ctx: &mut Context) -> Result<()> {
        endpoint.run(ctx)?;
        self.filters.run(ctx).map_err(|e| e.filter())
    }

    /// Methods a matched node answers, for the `Allow` header
    fn allowed(&self, node: &Node<Endpoint>) -> Vec<String> {
        let mut methods: Vec<String> = node.methods().into_iter().map(str::to_string).collect();
        if node.handler("GET").is_some() && node.handler("HEAD").is_none() {
            methods.push("HEAD".to_string());
        }
        if self.auto_options && node.handler("OPTIONS").is_none() {
            methods.push("OPTIONS".to_string());
        }
        methods.sort();
        methods
    }

    fn preflight(&self, req: Request, allow: &[&str]) -> Response {
        let mut ctx = Context::new(req);
        ctx.response
            .status(StatusCode::NO_CONTENT)
            .set_header("allow", allow.join(", "));
        match self.filters.run(&mut ctx) {
            Ok(()) => ctx.response.commit(false),
            Err(e) => error_response(&e.filter(), ctx.response, false),
        }
    }

    /// Static files for GET/HEAD, else 404
    fn fallback(&self, req: Request) -> Response {
        let head = req.method == Method::Head;
        if req.method == Method::Get || head {
            if let Some(res) = self.statics.serve(&req) {
                return res;
            }
        }
        let err = Error::RouteNotFound {
            method: req.method.to_string(),
            path: req.path,
        };
        error_response(&err, Reply::new(), head)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.tree.len())
            .field("filters", &self.filters.len())
            .field("auto_options", &self.auto_options)
            .finish()
    }
}

/// Turn a failed request into a text/plain reply
///
/// Status: the error's own, else a 4xx/5xx already set on the reply, else 500.
/// Headers written before the failure are kept.
fn error_response(err: &Error, mut reply: Reply, head: bool) -> Response {
    let status = err
        .explicit_status()
        .or_else(|| reply.status_code().filter(|s| s.as_u16() >= 400))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        error!(stage = err.stage(), status = status.as_u16(), error = %err.root(), "request failed");
    } else {
        warn!(stage = err.stage(), status = status.as_u16(), error = %err.root(), "request failed");
    }

    reply
        .cancel_upgrade()
        .status(status)
        .set_header("content-type", "text/plain; charset=utf-8")
        .remove_header("content-length")
        .remove_header("content-encoding")
        .body(err.root().to_string());
    reply.commit(head)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestBuilder;

    fn ok(ctx: &mut Context) -> Result<()> {
        ctx.response.text(200u16, "ok")
    }

    #[test]
    fn test_reregistration_replaces_controller() {
        let mut router = Router::new();
        router
            .get("/a", ok)
            .unwrap()
            .before(|ctx: &mut Context| {
                ctx.response.header("x-before", "1");
                Ok(())
            });
        router
            .get("/a", |ctx: &mut Context| ctx.response.text(200u16, "second"))
            .unwrap();

        assert_eq!(router.tree().len(), 1);
        let res = router.dispatch(Request::new(Method::Get, "/a"));
        assert_eq!(res.body_string().as_deref(), Some("second"));
        assert_eq!(res.header("x-before"), Some("1"));
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let mut router = Router::new();
        router.get("/page", ok).unwrap();

        let res = router.dispatch(Request::new(Method::Head, "/page"));
        assert_eq!(res.status, StatusCode::OK);
        assert!(res.body.is_empty());
        assert_eq!(res.header("content-length"), Some("2"));
    }

    #[test]
    fn test_allow_lists_node_methods() {
        let mut router = Router::new();
        router.get("/items", ok).unwrap();
        router.post("/items", ok).unwrap();

        let res = router.dispatch(Request::new(Method::Delete, "/items"));
        assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("GET, HEAD, POST"));
    }

    #[test]
    fn test_auto_options_runs_filters() {
        let mut router = Router::new();
        router.get("/items", ok).unwrap();
        router.auto_options(true).filter(|ctx: &mut Context| {
            ctx.response.set_header("access-control-allow-origin", "*");
            Ok(())
        });

        let res = router.dispatch(Request::new(Method::Options, "/items"));
        assert_eq!(res.status, StatusCode::NO_CONTENT);
        assert_eq!(res.header("allow"), Some("GET, HEAD, OPTIONS"));
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    }

    #[test]
    fn test_intermediate_node_is_not_found() {
        let mut router = Router::new();
        router.get("/a/b", ok).unwrap();

        let res = router.dispatch(Request::new(Method::Get, "/a"));
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.body_string().as_deref(), Some("Route not found: GET /a"));
    }

    #[test]
    fn test_error_status_resolution() {
        let mut router = Router::new();
        router
            .get("/explicit", |_ctx: &mut Context| Err(Error::status(409u16, "taken")))
            .unwrap();
        router
            .get("/preset", |ctx: &mut Context| {
                ctx.response.status(StatusCode::UNAUTHORIZED).header("www-authenticate", "Bearer");
                Err(Error::Internal("no token".into()))
            })
            .unwrap();
        router
            .get("/plain", |ctx: &mut Context| {
                ctx.response.status(StatusCode::CREATED);
                Err(Error::Internal("boom".into()))
            })
            .unwrap();

        let res = router.dispatch(Request::new(Method::Get, "/explicit"));
        assert_eq!(res.status, StatusCode::CONFLICT);
        assert_eq!(res.body_string().as_deref(), Some("taken"));

        let res = router.dispatch(Request::new(Method::Get, "/preset"));
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.header("www-authenticate"), Some("Bearer"));

        let res = router.dispatch(Request::new(Method::Get, "/plain"));
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_panic_becomes_500() {
        let mut router = Router::new();
        router
            .get("/boom", |_ctx: &mut Context| panic!("kaboom"))
            .unwrap();

        let res = router.dispatch(Request::new(Method::Get, "/boom"));
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body_string().as_deref(), Some("Handler panicked: kaboom"));
    }

    #[test]
    fn test_filter_error_is_reported() {
        let mut router = Router::new();
        router.get("/", ok).unwrap();
        router.filter(|_ctx: &mut Context| Err(Error::status(503u16, "draining")));

        let req = RequestBuilder::new(Method::Get, "/").build();
        let res = router.dispatch(req);
        assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.body_string().as_deref(), Some("draining"));
    }

    #[cfg(feature = "compress")]
    #[test]
    fn test_error_after_gzip_sends_plain_body() {
        use crate::middleware::{Gzip, GzipConfig};

        let mut router = Router::new();
        router
            .get("/big", |ctx: &mut Context| ctx.response.text(200u16, "fresh ".repeat(500)))
            .unwrap();
        router.add_filter(Gzip::new(GzipConfig::new().min_size(0)).into_filter());
        router.filter(|_ctx: &mut Context| Err(Error::status(503u16, "down")));

        let req = RequestBuilder::new(Method::Get, "/big")
            .header("Accept-Encoding", "gzip")
            .build();
        let res = router.dispatch(req);
        assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.header("content-encoding"), None);
        assert_eq!(res.body_string().as_deref(), Some("down"));
    }
}
