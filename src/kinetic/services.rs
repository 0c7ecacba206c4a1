// SPDX-License-Identifier: MIT

//! Named capability services and the HTTP step invoker

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use url::Url;

use crate::adk::error::{KineticError, Result};
use crate::adk::invoker::{HttpMethod, InvocationRequest, StepInvoker};

/// Capability name -> base address. Built once at startup, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Url>,
}

impl ServiceRegistry {
    /// Build from configured name/URL pairs, rejecting malformed URLs
    pub fn from_config(services: &BTreeMap<String, String>) -> Result<Self> {
        let mut parsed = HashMap::new();
        for (name, raw) in services {
            let url = Url::parse(raw).map_err(|e| {
                KineticError::config(format!("service '{}' has invalid URL '{}': {}", name, raw, e))
            })?;
            if url.cannot_be_a_base() {
                return Err(KineticError::config(format!(
                    "service '{}' URL '{}' cannot be used as a base address",
                    name, raw
                )));
            }
            parsed.insert(name.clone(), url);
        }
        Ok(Self { services: parsed })
    }

    pub fn base_url(&self, service: &str) -> Option<&Url> {
        self.services.get(service)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Absolute URL for an endpoint on a named service
    pub fn resolve(&self, service: &str, endpoint: &str) -> Result<Url> {
        let base = self.base_url(service).ok_or_else(|| {
            KineticError::capability(service, "service is not registered", None)
        })?;
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| {
            KineticError::capability(service, format!("invalid endpoint '{}': {}", endpoint, e), None)
        })
    }
}

/// [`StepInvoker`] that calls capability services over HTTP
#[derive(Clone)]
pub struct HttpInvoker {
    client: Client,
    registry: ServiceRegistry,
}

impl HttpInvoker {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            client: Client::new(),
            registry,
        }
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Remote error text: the body's `error` or `message` field, else the raw body
fn remote_error(body: &str, status: reqwest::StatusCode) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["error", "message", "detail"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
    });
    match from_json {
        Some(msg) => msg,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => format!(
            "HTTP {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .trim_end()
        .to_string(),
    }
}

#[async_trait]
impl StepInvoker for HttpInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> Result<Value> {
        let mut url = self.registry.resolve(&request.service, &request.endpoint)?;
        let method = to_method(request.method);

        let mut builder = if request.method == HttpMethod::Get {
            // GET carries an object payload as query parameters
            if let Some(params) = request.payload.as_object().filter(|p| !p.is_empty()) {
                let mut pairs = url.query_pairs_mut();
                for (k, v) in params {
                    match v {
                        Value::String(s) => pairs.append_pair(k, s),
                        other => pairs.append_pair(k, &other.to_string()),
                    };
                }
            }
            self.client.request(method, url.clone())
        } else {
            self.client.request(method, url.clone()).json(&request.payload)
        };
        builder = builder
            .header("Accept", "application/json")
            .timeout(request.timeout);

        log::debug!("{} {} ({})", request.method, url, request.service);

        let resp = builder.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("request timed out after {}ms", request.timeout.as_millis())
            } else {
                e.to_string()
            };
            KineticError::capability(&request.service, message, None)
        })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| KineticError::capability(&request.service, e.to_string(), Some(status.as_u16())))?;

        if !status.is_success() {
            let message = remote_error(&body, status);
            log::warn!(
                "{} {} returned {}: {}",
                request.method,
                url,
                status.as_u16(),
                message
            );
            return Err(KineticError::capability(
                &request.service,
                message,
                Some(status.as_u16()),
            ));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            KineticError::capability(
                &request.service,
                format!("response is not valid JSON: {}", e),
                Some(status.as_u16()),
            )
        })
    }
}
