//! Router and server configuration
//!
//! Deserialized from TOML:
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! options = true
//! default = ["index.html", "main.html"]
//!
//! [static]
//! "/assets" = "./public"
//!
//! [gzip]
//! level = 6
//! size = 1024
//!
//! [cors]
//! origins = ["*"]
//! methods = ["GET", "POST"]
//!
//! [limit]
//! body = "10mb"
//! ```

use crate::middleware::{BodyLimitConfig, Cors, CorsConfig, Gzip, GzipConfig};
use crate::{Result, Router};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Runtime worker threads, defaults to the CPU count
    pub workers: Option<usize>,
    /// Answer OPTIONS on every matched path
    pub options: bool,
    /// Log the route table at startup
    pub print_routes: bool,
    /// Directory default files, in order
    pub default: Vec<String>,
    /// URL prefix -> filesystem prefix
    #[serde(rename = "static")]
    pub statics: BTreeMap<String, PathBuf>,
    pub gzip: Option<GzipConfig>,
    pub cors: Option<CorsConfig>,
    pub limit: LimitConfig,
    /// Grace period for in-flight connections on shutdown
    pub shutdown_timeout_ms: u64,
}

/// Request limits
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    pub body: BodyLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
            options: false,
            print_routes: false,
            default: Vec::new(),
            statics: BTreeMap::new(),
            gzip: None,
            cors: None,
            limit: LimitConfig::default(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Install statics, defaults, OPTIONS handling and the global filters
    ///
    /// Filters run gzip first, then CORS.
    pub fn apply(&self, router: &mut Router) {
        for (url_prefix, fs_prefix) in &self.statics {
            router.statics(url_prefix, fs_prefix.clone());
        }
        if !self.default.is_empty() {
            router.default_files(self.default.iter().cloned());
        }
        router.auto_options(self.options);

        if let Some(gzip) = &self.gzip {
            router.add_filter(Gzip::new(gzip.clone()).into_filter());
        }
        if let Some(cors) = &self.cors {
            router.add_filter(Cors::new(cors.clone()).into_filter());
        }
        debug!(
            statics = self.statics.len(),
            gzip = self.gzip.is_some(),
            cors = self.cors.is_some(),
            "config applied"
        );
    }

    /// Transport settings
    #[cfg(feature = "server")]
    pub fn server_config(&self) -> crate::server::ServerConfig {
        crate::server::ServerConfig {
            hostname: self.host.clone(),
            port: self.port,
            workers: self.workers.unwrap_or_else(num_cpus::get),
            body_limit: self.limit.body.max_size,
            shutdown_timeout: std::time::Duration::from_millis(self.shutdown_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, Method, Request, RequestBuilder, StatusCode};

    const FULL: &str = r#"
        host = "127.0.0.1"
        port = 9000
        workers = 2
        options = true
        print_routes = true
        default = ["main.html"]

        [static]
        "/assets" = "./public"

        [gzip]
        level = 1
        size = 10
        types = ["text/plain"]

        [cors]
        origins = ["*"]
        methods = ["GET", "POST"]
        maxage = 60

        [limit]
        body = "2kb"
    "#;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.gzip.is_none());
        assert_eq!(config.limit.body, BodyLimitConfig::mb(10));
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(FULL).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.default, vec!["main.html"]);
        assert_eq!(config.statics.get("/assets"), Some(&PathBuf::from("./public")));
        assert_eq!(config.gzip.as_ref().map(|g| g.min_size), Some(10));
        assert_eq!(config.cors.as_ref().map(|c| c.max_age), Some(60));
        assert_eq!(config.limit.body.max_size, 2048);
    }

    #[test]
    fn test_invalid_config() {
        assert!(Config::from_toml_str("port = \"eighty\"").is_err());
        assert!(Config::from_toml_str("[limit]\nbody = \"huge\"").is_err());
    }

    #[test]
    fn test_apply_installs_filters() {
        let config = Config::from_toml_str(FULL).unwrap();
        let mut router = Router::new();
        router
            .get("/", |ctx: &mut Context| ctx.response.text(200u16, "hi"))
            .unwrap();
        config.apply(&mut router);

        let res = router.dispatch(RequestBuilder::new(Method::Get, "/").header("Origin", "x").build());
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert_eq!(res.header("access-control-max-age"), Some("60"));

        let res = router.dispatch(Request::new(Method::Options, "/"));
        assert_eq!(res.status, StatusCode::NO_CONTENT);
        assert_eq!(res.header("access-control-allow-methods"), Some("GET,POST"));
    }
}
