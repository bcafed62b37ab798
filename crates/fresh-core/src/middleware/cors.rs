//! CORS (Cross-Origin Resource Sharing) filter
//!
//! Adds CORS headers to every reply that reaches the global filters.
//! Preflight requests are answered by the router's automatic OPTIONS
//! handling, which runs the filters as well.

use crate::endpoint::HandlerFn;
use crate::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;

/// CORS configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins, `*` for any
    pub origins: Vec<String>,
    /// Allowed methods
    pub methods: Vec<String>,
    /// Allowed headers
    pub headers: Vec<String>,
    /// Exposed headers
    pub expose: Vec<String>,
    /// Allow credentials
    pub credentials: bool,
    /// Max age (seconds), 0 = omit
    #[serde(alias = "maxage")]
    pub max_age: u32,
}

impl CorsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.origins.push(origin.into());
        self
    }

    pub fn allow_all_origins(mut self) -> Self {
        self.origins = vec!["*".to_string()];
        self
    }

    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        let method = method.into().to_ascii_uppercase();
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn expose_header(mut self, header: impl Into<String>) -> Self {
        self.expose.push(header.into());
        self
    }

    pub fn allow_credentials(mut self) -> Self {
        self.credentials = true;
        self
    }

    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }
}

/// CORS filter
#[derive(Debug, Clone)]
pub struct Cors {
    config: CorsConfig,
}

impl Cors {
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }

    /// Simple CORS - allow all origins and the common methods
    pub fn permissive() -> Self {
        let config = ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
            .into_iter()
            .fold(CorsConfig::new().allow_all_origins(), CorsConfig::allow_method);
        Self::new(config)
    }

    /// Origin value to send back, if the request origin is allowed
    fn allowed_origin(&self, origin: Option<&str>) -> Option<String> {
        for allowed in &self.config.origins {
            if allowed == "*" {
                return Some("*".to_string());
            }
            if Some(allowed.as_str()) == origin {
                return Some(allowed.clone());
            }
        }
        None
    }

    /// Write CORS headers onto the reply
    pub fn apply(&self, ctx: &mut Context) -> Result<()> {
        let origin = self.allowed_origin(ctx.header("origin"));
        let res = &mut ctx.response;

        if let Some(origin) = origin {
            res.set_header("Access-Control-Allow-Origin", origin);
        }
        if !self.config.headers.is_empty() {
            res.set_header("Access-Control-Allow-Headers", self.config.headers.join(","));
        }
        if !self.config.methods.is_empty() {
            res.set_header("Access-Control-Allow-Methods", self.config.methods.join(","));
        }
        if self.config.credentials {
            res.set_header("Access-Control-Allow-Credentials", "true");
        }
        if !self.config.expose.is_empty() {
            res.set_header("Access-Control-Expose-Headers", self.config.expose.join(","));
        }
        if self.config.max_age > 0 {
            res.set_header("Access-Control-Max-Age", self.config.max_age.to_string());
        }
        Ok(())
    }

    /// As a global filter
    pub fn into_filter(self) -> HandlerFn {
        Arc::new(move |ctx: &mut Context| self.apply(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, RequestBuilder};

    fn ctx_from(origin: Option<&str>) -> Context {
        let mut builder = RequestBuilder::new(Method::Get, "/");
        if let Some(origin) = origin {
            builder = builder.header("Origin", origin);
        }
        Context::new(builder.build())
    }

    #[test]
    fn test_cors_permissive() {
        let cors = Cors::permissive();
        let mut ctx = ctx_from(Some("https://example.com"));
        cors.apply(&mut ctx).unwrap();

        assert_eq!(ctx.response.get_header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            ctx.response.get_header("access-control-allow-methods"),
            Some("GET,POST,PUT,PATCH,DELETE,OPTIONS")
        );
    }

    #[test]
    fn test_cors_specific_origin() {
        let cors = Cors::new(
            CorsConfig::new()
                .allow_origin("https://example.com")
                .allow_credentials()
                .max_age(600),
        );

        let mut ctx = ctx_from(Some("https://example.com"));
        cors.apply(&mut ctx).unwrap();
        assert_eq!(
            ctx.response.get_header("access-control-allow-origin"),
            Some("https://example.com")
        );
        assert_eq!(ctx.response.get_header("access-control-allow-credentials"), Some("true"));
        assert_eq!(ctx.response.get_header("access-control-max-age"), Some("600"));

        let mut ctx = ctx_from(Some("https://other.com"));
        cors.apply(&mut ctx).unwrap();
        assert_eq!(ctx.response.get_header("access-control-allow-origin"), None);
    }

    #[test]
    fn test_cors_headers_joined() {
        let cors = Cors::new(
            CorsConfig::new()
                .allow_header("Content-Type")
                .allow_header("Authorization")
                .expose_header("X-Total"),
        );
        let mut ctx = ctx_from(None);
        cors.into_filter()(&mut ctx).unwrap();

        assert_eq!(
            ctx.response.get_header("access-control-allow-headers"),
            Some("Content-Type,Authorization")
        );
        assert_eq!(ctx.response.get_header("access-control-expose-headers"), Some("X-Total"));
    }
}
