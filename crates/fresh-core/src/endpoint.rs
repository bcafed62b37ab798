//! Per-(route, method) handler entry

use crate::middleware::Chain;
use crate::{Context, Method, Result};
use std::fmt;
use std::sync::Arc;

/// Controller, middleware and filter signature
pub type HandlerFn = Arc<dyn Fn(&mut Context) -> Result<()> + Send + Sync>;

/// Box a closure or fn item as a [`HandlerFn`]
pub fn handler<F>(f: F) -> HandlerFn
where
    F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Controller plus the middleware wrapped around it
///
/// Group middleware lives in the outer layers so it always runs first on
/// the way in and last on the way out, no matter when route-level
/// middleware is chained on:
///
/// `outer_before` -> `before` -> controller -> `after` -> `outer_after`
pub struct Endpoint {
    method: Method,
    controller: HandlerFn,
    before: Chain,
    after: Chain,
    outer_before: Chain,
    outer_after: Chain,
}

impl Endpoint {
    pub(crate) fn new(method: Method, controller: HandlerFn) -> Self {
        Self {
            method,
            controller,
            before: Chain::new(),
            after: Chain::new(),
            outer_before: Chain::new(),
            outer_after: Chain::new(),
        }
    }

    /// Append route-level before middleware
    pub fn before<F>(&mut self, middleware: F) -> &mut Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.before.push(Arc::new(middleware));
        self
    }

    /// Append route-level after middleware
    pub fn after<F>(&mut self, middleware: F) -> &mut Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.after.push(Arc::new(middleware));
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub(crate) fn set_controller(&mut self, controller: HandlerFn) {
        self.controller = controller;
    }

    /// Append whole chains to the route-level lists
    pub(crate) fn attach(&mut self, before: &Chain, after: &Chain) {
        let before = missing(&self.before, before);
        let after = missing(&self.after, after);
        self.before.extend(&before);
        self.after.extend(&after);
    }

    /// Wrap with group middleware
    ///
    /// `before` is already parent-first, so it goes in front of any
    /// existing outer layer; `after` is already child-first. Layers the
    /// endpoint already carries are skipped, so registering the same route
    /// through the same group twice changes nothing.
    pub(crate) fn wrap(&mut self, before: &Chain, after: &Chain) {
        let before = missing(&self.outer_before, before);
        let after = missing(&self.outer_after, after);
        self.outer_before.prepend(&before);
        self.outer_after.extend(&after);
    }

    /// Before chain, controller, after chain; stops at the first error
    pub(crate) fn run(&self, ctx: &mut Context) -> Result<()> {
        self.outer_before.run(ctx).map_err(|e| e.middleware())?;
        self.before.run(ctx).map_err(|e| e.middleware())?;
        (self.controller)(ctx).map_err(|e| e.controller())?;
        self.after.run(ctx).map_err(|e| e.middleware())?;
        self.outer_after.run(ctx).map_err(|e| e.middleware())
    }

    /// Middleware counts (before, after) including group layers
    pub fn middleware_len(&self) -> (usize, usize) {
        (
            self.outer_before.len() + self.before.len(),
            self.after.len() + self.outer_after.len(),
        )
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (before, after) = self.middleware_len();
        f.debug_struct("Endpoint")
            .field("method", &self.method)
            .field("before", &before)
            .field("after", &after)
            .finish()
    }
}

/// Entries of `layer` not yet in `present`
fn missing(present: &Chain, layer: &Chain) -> Chain {
    let mut out = Chain::new();
    for handler in layer.iter() {
        if !present.contains(handler) {
            out.push(Arc::clone(handler));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Request};
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> HandlerFn {
        let log = Arc::clone(log);
        handler(move |_ctx: &mut Context| {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    fn ctx() -> Context {
        Context::new(Request::new(Method::Get, "/"))
    }

    #[test]
    fn test_layers_run_outside_route_middleware() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut endpoint = Endpoint::new(Method::Get, recorder(&log, "C"));

        // Route-level middleware chained before the group attaches
        let mut route_before = Chain::new();
        route_before.push(recorder(&log, "B2"));
        let mut route_after = Chain::new();
        route_after.push(recorder(&log, "A1"));
        endpoint.attach(&route_before, &route_after);

        let mut group_before = Chain::new();
        group_before.push(recorder(&log, "B1"));
        let mut group_after = Chain::new();
        group_after.push(recorder(&log, "A2"));
        endpoint.wrap(&group_before, &group_after);

        endpoint.run(&mut ctx()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["B1", "B2", "C", "A1", "A2"]);
        assert_eq!(endpoint.middleware_len(), (2, 2));
    }

    #[test]
    fn test_error_stops_chain_and_is_tagged() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut endpoint = Endpoint::new(Method::Get, recorder(&log, "C"));
        endpoint
            .before(|_ctx: &mut Context| Err(Error::status(401u16, "no token")))
            .after(|_ctx: &mut Context| panic!("after must not run"));

        let err = endpoint.run(&mut ctx()).unwrap_err();
        assert_eq!(err.stage(), "middleware");
        assert_eq!(err.root().to_string(), "no token");
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_wrap_skips_layers_already_present() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut endpoint = Endpoint::new(Method::Get, recorder(&log, "C"));
        let mut outer = Chain::new();
        outer.push(recorder(&log, "G1"));
        endpoint.wrap(&outer, &Chain::new());

        // Same group again plus an enclosing one
        let mut nested = Chain::new();
        nested.push(recorder(&log, "G0"));
        nested.extend(&outer);
        endpoint.wrap(&nested, &Chain::new());
        endpoint.wrap(&outer, &Chain::new());

        endpoint.run(&mut ctx()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["G0", "G1", "C"]);
        assert_eq!(endpoint.middleware_len(), (2, 0));
    }

    #[test]
    fn test_controller_replacement_keeps_middleware() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut endpoint = Endpoint::new(Method::Get, recorder(&log, "old"));
        let mut before = Chain::new();
        before.push(recorder(&log, "B"));
        endpoint.attach(&before, &Chain::new());
        endpoint.set_controller(recorder(&log, "new"));

        endpoint.run(&mut ctx()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["B", "new"]);
    }
}
