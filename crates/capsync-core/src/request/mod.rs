//! Declarative request model.
//!
//! A `RequestDescriptor` says what to call and how patiently; the executor
//! decides when and how often.

mod descriptor;

pub use descriptor::{
    Body, Method, PayloadClass, RequestDefaults, RequestDescriptor, DEFAULT_BASE_TIMEOUT,
    DEFAULT_RETRY_BUDGET,
};
