//! Todo list API
//!
//! ```text
//! cargo run -p fresh-core --example todos
//! curl -X POST localhost:8080/api/todos/1 -d 'buy milk'
//! curl localhost:8080/api/todos
//! websocat ws://localhost:8080/socket
//! ```

use fresh_core::{
    logging, Config, Context, Error, Resource, Result, Router, Server, StatusCode, WebSocket,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

const CONFIG: &str = r#"
host = "127.0.0.1"
port = 8080
options = true
print_routes = true

[gzip]
size = 256

[cors]
origins = ["*"]
methods = ["GET", "POST", "PUT", "PATCH", "DELETE"]

[limit]
body = "64kb"
"#;

type Store = Arc<Mutex<BTreeMap<u64, String>>>;

fn todo_json(id: u64, title: &str) -> String {
    let title = title.replace('\\', "\\\\").replace('"', "\\\"");
    format!(r#"{{"id":{},"title":"{}"}}"#, id, title)
}

fn todo_id(ctx: &Context) -> Result<u64> {
    ctx.param("todos")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::status(400u16, "todo id must be a number"))
}

fn title(ctx: &Context) -> Result<String> {
    match std::str::from_utf8(ctx.body()) {
        Ok(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(Error::status(StatusCode::UNPROCESSABLE_ENTITY, "title must be non-empty UTF-8")),
    }
}

fn todos(store: &Store) -> Resource {
    let (list, create, read, update, delete) = (
        Arc::clone(store),
        Arc::clone(store),
        Arc::clone(store),
        Arc::clone(store),
        Arc::clone(store),
    );

    Resource::new()
        .list(move |ctx: &mut Context| {
            let items = list.lock();
            let body: Vec<String> = items.iter().map(|(id, t)| todo_json(*id, t)).collect();
            ctx.response.json(200u16, format!("[{}]", body.join(",")))
        })
        .create(move |ctx: &mut Context| {
            let id = todo_id(ctx)?;
            let title = title(ctx)?;
            let mut items = create.lock();
            if items.contains_key(&id) {
                return Err(Error::status(409u16, format!("todo {} exists", id)));
            }
            let body = todo_json(id, &title);
            items.insert(id, title);
            ctx.response.json(StatusCode::CREATED, body)
        })
        .read(move |ctx: &mut Context| {
            let id = todo_id(ctx)?;
            match read.lock().get(&id) {
                Some(t) => ctx.response.json(200u16, todo_json(id, t)),
                None => Err(Error::status(404u16, format!("todo {} not found", id))),
            }
        })
        .update(move |ctx: &mut Context| {
            let id = todo_id(ctx)?;
            let title = title(ctx)?;
            match update.lock().get_mut(&id) {
                Some(t) => {
                    *t = title;
                    ctx.response.json(200u16, todo_json(id, t))
                }
                None => Err(Error::status(404u16, format!("todo {} not found", id))),
            }
        })
        .delete(move |ctx: &mut Context| {
            let id = todo_id(ctx)?;
            delete.lock().remove(&id);
            ctx.response.status(StatusCode::NO_CONTENT);
            Ok(())
        })
}

fn main() -> Result<()> {
    logging::init("fresh_core=debug,todos=info");

    let config = Config::from_toml_str(CONFIG)?;
    let store: Store = Arc::default();

    let mut router = Router::new();
    router.get("/", |ctx: &mut Context| ctx.response.text(200u16, "fresh todos"))?;
    router.ws("/socket", |ws: &mut WebSocket| {
        ws.send("Hello, Client!")?;
        while let Some(message) = ws.receive() {
            tracing::info!(?message, "socket message");
            ws.send(message)?;
        }
        Ok(())
    })?;

    let mut api = router.group("/api").after(|ctx: &mut Context| {
        ctx.response.set_header("x-powered-by", "fresh");
        Ok(())
    });
    api.crud("/todos", todos(&store))?;

    config.apply(&mut router);
    if config.print_routes {
        router.print_routes();
    }

    Server::new(router, config.server_config()).run()
}
