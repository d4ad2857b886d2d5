use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Attempts per operation when the caller does not set a budget.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// First-attempt timeout when the caller does not set one.
pub const DEFAULT_BASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Budget and first-attempt timeout that protocol mappings stamp on the
/// descriptors they build (`[retry]` in config.toml).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDefaults {
    pub retry_budget: u32,
    pub base_timeout: Duration,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            base_timeout: DEFAULT_BASE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the call is a small API call or a large binary transfer.
/// Selects the transport's deadline floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadClass {
    #[default]
    Small,
    Large,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Binary {
        content_type: String,
        data: Vec<u8>,
    },
}

impl Body {
    pub fn content_type(&self) -> Option<&str> {
        match self {
            Body::Empty => None,
            Body::Json(_) => Some("application/json"),
            Body::Binary { content_type, .. } => Some(content_type),
        }
    }

    /// Serialized body bytes as sent on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Body::Empty => Vec::new(),
            Body::Json(v) => serde_json::to_vec(v).unwrap_or_default(),
            Body::Binary { data, .. } => data.clone(),
        }
    }
}

/// One remote operation, described before execution. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    method: Method,
    endpoint: String,
    body: Body,
    headers: Vec<(String, String)>,
    requires_auth: bool,
    retry_budget: u32,
    base_timeout: Duration,
    custom_timeout: Option<Duration>,
    class: PayloadClass,
}

impl RequestDescriptor {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: Body::Empty,
            headers: Vec::new(),
            requires_auth: false,
            retry_budget: DEFAULT_RETRY_BUDGET,
            base_timeout: DEFAULT_BASE_TIMEOUT,
            custom_timeout: None,
            class: PayloadClass::Small,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Post, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Put, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint)
    }

    /// Apply configured budget and base timeout.
    pub fn with_defaults(self, defaults: &RequestDefaults) -> Self {
        self.retry_budget(defaults.retry_budget)
            .base_timeout(defaults.base_timeout)
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn binary(mut self, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.body = Body::Binary {
            content_type: content_type.into(),
            data,
        };
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn requires_auth(mut self, yes: bool) -> Self {
        self.requires_auth = yes;
        self
    }

    /// Total attempts allowed. Values below 1 are treated as 1.
    pub fn retry_budget(mut self, attempts: u32) -> Self {
        self.retry_budget = attempts.max(1);
        self
    }

    pub fn base_timeout(mut self, timeout: Duration) -> Self {
        self.base_timeout = timeout;
        self
    }

    /// Overrides the base timeout for this operation only.
    pub fn custom_timeout(mut self, timeout: Duration) -> Self {
        self.custom_timeout = Some(timeout);
        self
    }

    pub fn payload_class(mut self, class: PayloadClass) -> Self {
        self.class = class;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn needs_auth(&self) -> bool {
        self.requires_auth
    }

    pub fn attempts(&self) -> u32 {
        self.retry_budget.max(1)
    }

    pub fn class(&self) -> PayloadClass {
        self.class
    }

    /// Custom timeout if set, else the base timeout.
    pub fn effective_timeout(&self) -> Duration {
        self.custom_timeout.unwrap_or(self.base_timeout)
    }
}
