// SPDX-License-Identifier: MIT

//! Step invoker - call-a-named-capability abstraction
//!
//! Both engines reach external services only through [`StepInvoker`], which
//! keeps them testable without a network and lets transports be swapped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::adk::error::Result;

/// HTTP method for a capability call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// One outbound call to a named capability
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    /// Logical service name, resolved to a base address by the invoker
    pub service: String,
    /// Path appended to the service's base address
    pub endpoint: String,
    pub method: HttpMethod,
    pub payload: Value,
    pub timeout: Duration,
}

impl InvocationRequest {
    pub fn new(service: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            endpoint: endpoint.into(),
            method: HttpMethod::Post,
            payload: Value::Null,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Trait for anything that can execute a capability call.
///
/// Implementations return the parsed JSON body of a successful (2xx) call.
/// Any other status, a transport error, or a timeout must surface as
/// `KineticError::CapabilityCall` (or `Timeout`), carrying the remote error
/// message when the service supplied one.
#[async_trait]
pub trait StepInvoker: Send + Sync {
    async fn invoke(&self, request: &InvocationRequest) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let req = InvocationRequest::new("media", "/validate")
            .with_method(HttpMethod::Get)
            .with_payload(json!({"url": "u"}))
            .with_timeout(Duration::from_millis(500));
        assert_eq!(req.service, "media");
        assert_eq!(req.endpoint, "/validate");
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.payload["url"], "u");
        assert_eq!(req.timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_method_serde_uppercase() {
        assert_eq!(serde_json::to_value(HttpMethod::Patch).unwrap(), "PATCH");
        let m: HttpMethod = serde_json::from_value(json!("DELETE")).unwrap();
        assert_eq!(m, HttpMethod::Delete);
        assert_eq!(HttpMethod::default().to_string(), "POST");
    }
}
