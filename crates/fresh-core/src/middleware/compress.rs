//! Gzip response filter

use crate::endpoint::HandlerFn;
use crate::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_LEVEL: u32 = 6;
const MAX_LEVEL: i32 = 9;

/// Gzip configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GzipConfig {
    /// 0 (store) ..= 9 (best); anything else uses the default level
    pub level: i32,
    /// Smallest body worth compressing
    #[serde(alias = "size")]
    pub min_size: usize,
    /// Content types to compress; empty means text-like types
    pub types: Vec<String>,
}

impl Default for GzipConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL as i32,
            min_size: 1024, // Don't compress < 1KB
            types: Vec::new(),
        }
    }
}

impl GzipConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.types.push(content_type.into());
        self
    }
}

/// Gzip filter
#[derive(Debug, Clone)]
pub struct Gzip {
    config: GzipConfig,
}

impl Gzip {
    pub fn new(config: GzipConfig) -> Self {
        Self { config }
    }

    #[cfg_attr(not(feature = "compress"), allow(dead_code))]
    fn level(&self) -> u32 {
        if (0..=MAX_LEVEL).contains(&self.config.level) {
            self.config.level as u32
        } else {
            DEFAULT_LEVEL
        }
    }

    fn should_compress(&self, content_type: &str, size: usize) -> bool {
        if size < self.config.min_size {
            return false;
        }
        if content_type.is_empty() {
            return true;
        }
        if !self.config.types.is_empty() {
            return self.config.types.iter().any(|t| content_type.contains(t.as_str()));
        }

        content_type.starts_with("text/")
            || content_type.contains("json")
            || content_type.contains("xml")
            || content_type.contains("javascript")
            || content_type.contains("css")
    }

    #[cfg(feature = "compress")]
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level()));
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    #[cfg(not(feature = "compress"))]
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    /// Compress the reply body in place when the client accepts gzip
    pub fn apply(&self, ctx: &mut Context) -> Result<()> {
        let accepts = ctx
            .header("accept-encoding")
            .map(|v| v.contains("gzip"))
            .unwrap_or(false);
        if !accepts {
            return Ok(());
        }

        let res = &mut ctx.response;
        if res.get_header("content-encoding").is_some() {
            return Ok(());
        }
        let content_type = res.get_header("content-type").unwrap_or("");
        let body_len = res.body_bytes().len();
        if !self.should_compress(content_type, body_len) {
            return Ok(());
        }

        let compressed = self.encode(res.body_bytes())?;

        // Only use compressed if smaller
        if compressed.len() < body_len {
            res.body(compressed)
                .set_header("Content-Encoding", "gzip")
                .set_header("Vary", "Accept-Encoding")
                .remove_header("content-length");
        }
        Ok(())
    }

    /// As a global filter
    pub fn into_filter(self) -> HandlerFn {
        Arc::new(move |ctx: &mut Context| self.apply(ctx))
    }
}

impl Default for Gzip {
    fn default() -> Self {
        Self::new(GzipConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, RequestBuilder};

    fn ctx_accepting(encoding: &str) -> Context {
        Context::new(
            RequestBuilder::new(Method::Get, "/")
                .header("Accept-Encoding", encoding)
                .build(),
        )
    }

    #[test]
    fn test_should_compress() {
        let gzip = Gzip::default();

        assert!(gzip.should_compress("text/html", 2000));
        assert!(gzip.should_compress("application/json", 2000));
        assert!(gzip.should_compress("", 2000));
        assert!(!gzip.should_compress("image/png", 2000));
        assert!(!gzip.should_compress("text/html", 500)); // Too small
    }

    #[test]
    fn test_configured_types() {
        let gzip = Gzip::new(GzipConfig::new().min_size(0).content_type("application/wasm"));
        assert!(gzip.should_compress("application/wasm", 10));
        assert!(!gzip.should_compress("text/html", 10));
    }

    #[test]
    fn test_invalid_level_uses_default() {
        assert_eq!(Gzip::new(GzipConfig::new().level(42)).level(), DEFAULT_LEVEL);
        assert_eq!(Gzip::new(GzipConfig::new().level(-1)).level(), DEFAULT_LEVEL);
        assert_eq!(Gzip::new(GzipConfig::new().level(1)).level(), 1);
    }

    #[cfg(feature = "compress")]
    #[test]
    fn test_compresses_large_text() {
        let gzip = Gzip::new(GzipConfig::new().min_size(16));
        let mut ctx = ctx_accepting("gzip, deflate");
        ctx.response.text(200u16, "fresh ".repeat(200)).unwrap();
        ctx.response.header("content-length", "1200");

        gzip.apply(&mut ctx).unwrap();

        assert_eq!(ctx.response.get_header("content-encoding"), Some("gzip"));
        assert_eq!(ctx.response.get_header("vary"), Some("Accept-Encoding"));
        assert_eq!(ctx.response.get_header("content-length"), None);
        assert!(ctx.response.body_bytes().len() < 1200);
        assert_eq!(&ctx.response.body_bytes()[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_skips_without_accept_encoding() {
        let gzip = Gzip::new(GzipConfig::new().min_size(0));
        let mut ctx = ctx_accepting("br");
        ctx.response.text(200u16, "fresh ".repeat(200)).unwrap();

        gzip.apply(&mut ctx).unwrap();
        assert_eq!(ctx.response.get_header("content-encoding"), None);
        assert_eq!(ctx.response.body_bytes().len(), 1200);
    }

    #[test]
    fn test_leaves_encoded_body_alone() {
        let gzip = Gzip::new(GzipConfig::new().min_size(0));
        let mut ctx = ctx_accepting("gzip");
        ctx.response.text(200u16, "fresh ".repeat(200)).unwrap();
        ctx.response.header("Content-Encoding", "br");

        gzip.apply(&mut ctx).unwrap();
        assert_eq!(ctx.response.get_header("content-encoding"), Some("br"));
        assert_eq!(ctx.response.body_bytes().len(), 1200);
    }
}
