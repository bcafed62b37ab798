//! Static file fallback
//!
//! Consulted by the router only when no route matches a GET or HEAD
//! request. URL prefixes map onto filesystem prefixes; the longest mounted
//! prefix that ends on a segment boundary wins.

use crate::{Method, Request, Response, ResponseBuilder, StatusCode};
use fresh_router::path;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// One URL prefix served from one directory
#[derive(Debug, Clone)]
struct Mount {
    prefix: String,
    root: PathBuf,
}

impl Mount {
    /// Remainder of `request_path` below this mount, if it is inside it
    fn strip<'a>(&self, request_path: &'a str) -> Option<&'a str> {
        if self.prefix == "/" {
            return Some(request_path);
        }
        let rest = request_path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

/// Static asset mapping
#[derive(Debug, Clone)]
pub struct StaticAssets {
    mounts: Vec<Mount>,
    defaults: Vec<String>,
}

impl Default for StaticAssets {
    fn default() -> Self {
        Self {
            mounts: Vec::new(),
            defaults: vec!["index.html".to_string()],
        }
    }
}

impl StaticAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `url_prefix` from `root`; re-mounting a prefix replaces its root
    pub fn mount(&mut self, url_prefix: &str, root: impl Into<PathBuf>) {
        let prefix = path::join("", url_prefix);
        let root = root.into();
        match self.mounts.iter_mut().find(|m| m.prefix == prefix) {
            Some(mount) => mount.root = root,
            None => self.mounts.push(Mount { prefix, root }),
        }
        self.mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    }

    /// Replace the directory default files, tried in order
    pub fn set_defaults<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defaults = names.into_iter().map(Into::into).collect();
    }

    pub fn add_default(&mut self, name: impl Into<String>) {
        self.defaults.push(name.into());
    }

    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Resolve a request path to an existing file
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let (mount, rest) = self
            .mounts
            .iter()
            .find_map(|m| m.strip(request_path).map(|rest| (m, rest)))?;

        let full_path = mount.root.join(sanitize_path(rest)?);
        let meta = std::fs::metadata(&full_path).ok()?;
        if meta.is_file() {
            return Some(full_path);
        }
        if meta.is_dir() {
            return self
                .defaults
                .iter()
                .map(|name| full_path.join(name))
                .find(|candidate| candidate.is_file());
        }
        None
    }

    /// Serve a file for `req`; `None` when nothing is mounted or found there
    pub fn serve(&self, req: &Request) -> Option<Response> {
        let file = self.resolve(&req.path)?;
        let meta = std::fs::metadata(&file).ok()?;

        let etag = generate_etag(&meta);
        if req.header("if-none-match") == Some(etag.as_str()) {
            return Some(
                ResponseBuilder::new(StatusCode::NOT_MODIFIED)
                    .header("ETag", etag)
                    .build(),
            );
        }

        let content = match std::fs::read(&file) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %file.display(), error = %e, "static read failed");
                return None;
            }
        };

        let builder = ResponseBuilder::new(StatusCode::OK)
            .header("Content-Type", mime_type(&file))
            .header("Content-Length", content.len().to_string())
            .header("ETag", etag);

        // HEAD request - no body
        if req.method == Method::Head {
            Some(builder.build())
        } else {
            Some(builder.body(content).build())
        }
    }
}

/// Sanitize request path to prevent directory traversal
fn sanitize_path(path: &str) -> Option<PathBuf> {
    let path = path.trim_start_matches('/');

    // Check for hidden files
    if path.split('/').any(|s| s.starts_with('.') && s != ".") {
        return None;
    }

    let mut result = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(c) => result.push(c),
            Component::ParentDir => return None, // Prevent ../
            _ => {}
        }
    }

    Some(result)
}

fn generate_etag(meta: &std::fs::Metadata) -> String {
    use std::time::UNIX_EPOCH;

    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    format!("\"{:x}-{:x}\"", mtime, meta.len())
}

/// Content type by file extension
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext.to_lowercase().as_str() {
        // Text
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv",

        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",

        // Fonts
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",

        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "wasm" => "application/wasm",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestBuilder;
    use std::fs;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("css")).unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(dir.path().join("css/site.css"), "body{}").unwrap();
        fs::write(dir.path().join("docs/main.html"), "docs").unwrap();
        fs::write(dir.path().join(".env"), "SECRET=1").unwrap();
        dir
    }

    #[test]
    fn test_sanitize_path() {
        assert!(sanitize_path("/index.html").is_some());
        assert!(sanitize_path("/css/style.css").is_some());
        assert!(sanitize_path("/../etc/passwd").is_none());
        assert!(sanitize_path("/.hidden").is_none());
        assert_eq!(sanitize_path("").unwrap(), PathBuf::new());
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(mime_type(Path::new("style.CSS")), "text/css; charset=utf-8");
        assert_eq!(mime_type(Path::new("image.png")), "image/png");
        assert_eq!(mime_type(Path::new("unknown")), "application/octet-stream");
    }

    #[test]
    fn test_prefix_must_end_on_segment() {
        let dir = site();
        let mut assets = StaticAssets::new();
        assets.mount("/assets", dir.path());

        assert!(assets.resolve("/assets/css/site.css").is_some());
        assert!(assets.resolve("/assetsx/css/site.css").is_none());
        assert!(assets.resolve("/css/site.css").is_none());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let dir = site();
        let mut assets = StaticAssets::new();
        assets.mount("/", dir.path());
        assets.mount("/styles", dir.path().join("css"));

        assert_eq!(assets.resolve("/styles/site.css").unwrap(), dir.path().join("css/site.css"));
        assert_eq!(assets.resolve("/css/site.css").unwrap(), dir.path().join("css/site.css"));
    }

    #[test]
    fn test_directory_defaults() {
        let dir = site();
        let mut assets = StaticAssets::new();
        assets.mount("/", dir.path());

        assert_eq!(assets.resolve("/").unwrap(), dir.path().join("index.html"));
        assert!(assets.resolve("/docs").is_none());

        assets.add_default("main.html");
        assert_eq!(assets.resolve("/docs/").unwrap(), dir.path().join("docs/main.html"));
    }

    #[test]
    fn test_hidden_and_traversal_rejected() {
        let dir = site();
        let mut assets = StaticAssets::new();
        assets.mount("/public", dir.path().join("css"));

        assert!(assets.resolve("/public/../index.html").is_none());
        assets.mount("/", dir.path());
        assert!(assets.resolve("/.env").is_none());
    }

    #[test]
    fn test_serve_etag_and_head() {
        let dir = site();
        let mut assets = StaticAssets::new();
        assets.mount("/", dir.path());

        let res = assets.serve(&Request::new(Method::Get, "/css/site.css")).unwrap();
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("text/css; charset=utf-8"));
        assert_eq!(res.body_string().as_deref(), Some("body{}"));
        let etag = res.header("etag").unwrap().to_string();

        let cached = RequestBuilder::new(Method::Get, "/css/site.css")
            .header("If-None-Match", etag)
            .build();
        assert_eq!(assets.serve(&cached).unwrap().status, StatusCode::NOT_MODIFIED);

        let head = assets.serve(&Request::new(Method::Head, "/css/site.css")).unwrap();
        assert!(head.body.is_empty());
        assert_eq!(head.header("content-length"), Some("6"));
    }
}
