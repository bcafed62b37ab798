//! CRUD resource helper
//!
//! Registers the conventional collection/item routes for one base path.
//! The item parameter is named after the last segment of the base, so
//! `/todos` yields `/todos/{todos}`.
//!
//! | handler  | route                      |
//! |----------|----------------------------|
//! | `list`   | `GET base`                 |
//! | `create` | `POST base/{last}`         |
//! | `read`   | `GET base/{last}`          |
//! | `update` | `PUT`, `PATCH base/{last}` |
//! | `delete` | `DELETE base/{last}`       |

use crate::endpoint::{handler, HandlerFn};
use crate::middleware::Chain;
use crate::{Context, Error, Method, Result, Router};
use fresh_router::path;

/// Handlers for one resource; unset handlers register no route
#[derive(Clone, Default)]
pub struct Resource {
    list: Option<HandlerFn>,
    create: Option<HandlerFn>,
    read: Option<HandlerFn>,
    update: Option<HandlerFn>,
    delete: Option<HandlerFn>,
    before: Chain,
    after: Chain,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list<F>(mut self, controller: F) -> Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.list = Some(handler(controller));
        self
    }

    pub fn create<F>(mut self, controller: F) -> Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.create = Some(handler(controller));
        self
    }

    pub fn read<F>(mut self, controller: F) -> Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.read = Some(handler(controller));
        self
    }

    pub fn update<F>(mut self, controller: F) -> Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.update = Some(handler(controller));
        self
    }

    pub fn delete<F>(mut self, controller: F) -> Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.delete = Some(handler(controller));
        self
    }

    /// Before middleware shared by every route of the resource
    pub fn before<F>(mut self, middleware: F) -> Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.before.push(handler(middleware));
        self
    }

    /// After middleware shared by every route of the resource
    pub fn after<F>(mut self, middleware: F) -> Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.after.push(handler(middleware));
        self
    }

    /// Item route for `base`, e.g. `/api/todos/{todos}`
    pub fn item_path(base: &str) -> Result<String> {
        match path::split(base).last() {
            Some(last) if !last.is_empty() && !path::is_param(last) => {
                Ok(path::join(base, &format!("{{{}}}", last)))
            }
            _ => Err(Error::InvalidPath(base.to_string())),
        }
    }

    pub(crate) fn register(
        &self,
        router: &mut Router,
        base: &str,
        group_before: &Chain,
        group_after: &Chain,
    ) -> Result<()> {
        let base = path::join("", base);
        let item = Self::item_path(&base)?;

        let routes = [
            (Method::Get, &base, &self.list),
            (Method::Post, &item, &self.create),
            (Method::Get, &item, &self.read),
            (Method::Put, &item, &self.update),
            (Method::Patch, &item, &self.update),
            (Method::Delete, &item, &self.delete),
        ];

        for (method, pattern, controller) in routes {
            let Some(controller) = controller else {
                continue;
            };
            let (endpoint, _) = router.upsert(method, pattern, controller.clone())?;
            endpoint.attach(&self.before, &self.after);
            endpoint.wrap(group_before, group_after);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("list", &self.list.is_some())
            .field("create", &self.create.is_some())
            .field("read", &self.read.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, StatusCode};

    fn named(name: &'static str) -> impl Fn(&mut Context) -> Result<()> + Send + Sync + 'static {
        move |ctx: &mut Context| {
            let id = ctx.param("todos").unwrap_or("-").to_string();
            ctx.response.text(200u16, format!("{} {}", name, id))
        }
    }

    fn full() -> Resource {
        Resource::new()
            .list(named("list"))
            .create(named("create"))
            .read(named("read"))
            .update(named("update"))
            .delete(named("delete"))
    }

    fn body(router: &Router, method: Method, path: &str) -> String {
        router
            .dispatch(Request::new(method, path))
            .body_string()
            .unwrap_or_default()
    }

    #[test]
    fn test_item_path() {
        assert_eq!(Resource::item_path("/api/todos").unwrap(), "/api/todos/{todos}");
        assert_eq!(Resource::item_path("todos/").unwrap(), "/todos/{todos}");
        assert!(Resource::item_path("/").is_err());
        assert!(Resource::item_path("/users/{id}").is_err());
    }

    #[test]
    fn test_crud_routes() {
        let mut router = Router::new();
        router.crud("/todos", full()).unwrap();

        assert_eq!(body(&router, Method::Get, "/todos"), "list -");
        assert_eq!(body(&router, Method::Post, "/todos/1"), "create 1");
        assert_eq!(body(&router, Method::Get, "/todos/2"), "read 2");
        assert_eq!(body(&router, Method::Put, "/todos/3"), "update 3");
        assert_eq!(body(&router, Method::Patch, "/todos/4"), "update 4");
        assert_eq!(body(&router, Method::Delete, "/todos/5"), "delete 5");
        assert_eq!(router.routes().len(), 6);
    }

    #[test]
    fn test_missing_handlers_register_nothing() {
        let mut router = Router::new();
        router.crud("/todos", Resource::new().list(named("list"))).unwrap();

        assert_eq!(router.routes().len(), 1);
        let res = router.dispatch(Request::new(Method::Get, "/todos/1"));
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_shared_middleware_and_group() {
        let mut router = Router::new();
        let resource = full().before(|ctx: &mut Context| {
            if ctx.header("authorization").is_none() {
                return Err(Error::status(401u16, "unauthorized"));
            }
            Ok(())
        });
        router.group("/api").crud("todos", resource).unwrap();

        let res = router.dispatch(Request::new(Method::Delete, "/api/todos/5"));
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.body_string().as_deref(), Some("unauthorized"));
    }
}
