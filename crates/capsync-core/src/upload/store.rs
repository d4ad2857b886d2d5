//! Object store and metadata registry protocols.
//!
//! These only map operations onto descriptors and parse successful
//! responses; all I/O goes through the request executor.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::strategy::Chunk;
use crate::config::CapsyncConfig;
use crate::request::{PayloadClass, RequestDefaults, RequestDescriptor};
use crate::transport::Response;

pub trait ObjectStoreApi: Send + Sync {
    /// Whole payload in one request. Response carries the object locator.
    fn simple_upload(&self, object_key: &str, content_type: &str, data: Vec<u8>) -> RequestDescriptor;

    /// Open a resumable session. Response carries the session id.
    fn create_session(
        &self,
        object_key: &str,
        content_type: &str,
        total_bytes: u64,
        chunk_size: u64,
    ) -> RequestDescriptor;

    fn put_chunk(&self, session_id: &str, chunk: &Chunk, total_bytes: u64, data: Vec<u8>) -> RequestDescriptor;

    /// Close a session once every chunk is confirmed. Response carries the object locator.
    fn finalize_session(&self, session_id: &str) -> RequestDescriptor;

    fn delete_object(&self, locator: &str) -> RequestDescriptor;

    fn parse_locator(&self, response: &Response) -> serde_json::Result<String>;

    fn parse_session_id(&self, response: &Response) -> serde_json::Result<String>;
}

/// Description of an uploaded object sent to the metadata registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRegistration {
    pub locator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_locator: Option<String>,
    pub content_type: String,
    pub size_bytes: u64,
    /// Caller-supplied fields (title, capsule id, ...).
    pub metadata: Value,
}

pub trait MetadataApi: Send + Sync {
    fn register(&self, registration: &MediaRegistration) -> RequestDescriptor;

    fn parse_identifier(&self, response: &Response) -> serde_json::Result<String>;
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

#[derive(Deserialize)]
struct LocatorBody {
    locator: String,
}

#[derive(Deserialize)]
struct SessionBody {
    session_id: String,
}

#[derive(Deserialize)]
struct IdBody {
    id: Value,
}

/// JSON/REST object store:
///
/// - `PUT {base}/objects/{key}` (raw body) -> `{"locator"}`
/// - `POST {base}/uploads` -> `{"session_id"}`
/// - `PUT {base}/uploads/{session}/chunks/{index}` with `Content-Range`
/// - `POST {base}/uploads/{session}/finalize` -> `{"locator"}`
/// - `DELETE {base}/objects` with `{"locator"}`
#[derive(Debug, Clone)]
pub struct RestObjectStore {
    base: String,
    defaults: RequestDefaults,
}

impl RestObjectStore {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            defaults: RequestDefaults::default(),
        }
    }

    pub fn from_config(cfg: &CapsyncConfig) -> Self {
        Self::new(cfg.store_base_url.clone()).with_defaults(cfg.request_defaults())
    }

    pub fn with_defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }
}

impl ObjectStoreApi for RestObjectStore {
    fn simple_upload(&self, object_key: &str, content_type: &str, data: Vec<u8>) -> RequestDescriptor {
        RequestDescriptor::put(join(&self.base, &format!("objects/{object_key}")))
            .with_defaults(&self.defaults)
            .binary(content_type, data)
            .requires_auth(true)
            .payload_class(PayloadClass::Large)
    }

    fn create_session(
        &self,
        object_key: &str,
        content_type: &str,
        total_bytes: u64,
        chunk_size: u64,
    ) -> RequestDescriptor {
        RequestDescriptor::post(join(&self.base, "uploads"))
            .with_defaults(&self.defaults)
            .json(json!({
                "object_key": object_key,
                "content_type": content_type,
                "total_bytes": total_bytes,
                "chunk_size": chunk_size,
            }))
            .requires_auth(true)
    }

    fn put_chunk(&self, session_id: &str, chunk: &Chunk, total_bytes: u64, data: Vec<u8>) -> RequestDescriptor {
        RequestDescriptor::put(join(
            &self.base,
            &format!("uploads/{session_id}/chunks/{}", chunk.index),
        ))
        .with_defaults(&self.defaults)
        .binary("application/octet-stream", data)
        .header("Content-Range", chunk.content_range(total_bytes))
        .requires_auth(true)
        .payload_class(PayloadClass::Large)
    }

    fn finalize_session(&self, session_id: &str) -> RequestDescriptor {
        RequestDescriptor::post(join(&self.base, &format!("uploads/{session_id}/finalize")))
            .with_defaults(&self.defaults)
            .requires_auth(true)
            .payload_class(PayloadClass::Large)
    }

    fn delete_object(&self, locator: &str) -> RequestDescriptor {
        RequestDescriptor::delete(join(&self.base, "objects"))
            .with_defaults(&self.defaults)
            .json(json!({ "locator": locator }))
            .requires_auth(true)
    }

    fn parse_locator(&self, response: &Response) -> serde_json::Result<String> {
        response.json::<LocatorBody>().map(|b| b.locator)
    }

    fn parse_session_id(&self, response: &Response) -> serde_json::Result<String> {
        response.json::<SessionBody>().map(|b| b.session_id)
    }
}

/// JSON/REST metadata registry: `POST {base}/media` -> `{"id"}`.
#[derive(Debug, Clone)]
pub struct RestMetadataRegistry {
    base: String,
    defaults: RequestDefaults,
}

impl RestMetadataRegistry {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            defaults: RequestDefaults::default(),
        }
    }

    pub fn from_config(cfg: &CapsyncConfig) -> Self {
        Self::new(cfg.api_base_url.clone()).with_defaults(cfg.request_defaults())
    }

    pub fn with_defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }
}

impl MetadataApi for RestMetadataRegistry {
    fn register(&self, registration: &MediaRegistration) -> RequestDescriptor {
        // Serializing a struct of strings, numbers and a Value cannot fail.
        let body = serde_json::to_value(registration).unwrap_or(Value::Null);
        RequestDescriptor::post(join(&self.base, "media"))
            .with_defaults(&self.defaults)
            .json(body)
            .requires_auth(true)
    }

    /// Accepts numeric or string ids.
    fn parse_identifier(&self, response: &Response) -> serde_json::Result<String> {
        let body = response.json::<IdBody>()?;
        Ok(match body.id {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }
}
