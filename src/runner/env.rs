//! Environment construction for function invocations.
//!
//! Keys are written in a fixed order and later writes win:
//!
//! 1. `METHOD`, `ROUTE`, `PAYLOAD`, `REQUEST_URL`
//! 2. app config as `CONFIG_<KEY>`
//! 3. route config as `CONFIG_<KEY>`, overriding app config
//! 4. path parameters as `PARAM_<NAME>`
//! 5. request headers as `HEADER_<NAME>`, repeated values joined by a space

use crate::routing::Params;
use std::collections::HashMap;

/// Flat environment handed to the execution backend.
pub type Environment = HashMap<String, String>;

/// The request payload is not a JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPayload {
    pub message: String,
}

impl std::fmt::Display for InvalidPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid JSON payload: {}", self.message)
    }
}

impl std::error::Error for InvalidPayload {}

/// Inputs to [`build_environment`].
#[derive(Debug, Clone, Copy)]
pub struct EnvInput<'a> {
    pub method: &'a str,
    /// The matched route pattern, not the raw request path.
    pub route: &'a str,
    pub payload: &'a [u8],
    pub request_url: &'a str,
    pub app_config: &'a HashMap<String, String>,
    pub route_config: &'a HashMap<String, String>,
    pub params: &'a Params,
    /// Request headers in arrival order.
    pub headers: &'a [(String, String)],
}

/// Build the environment for one invocation.
///
/// A non-empty payload must parse as a JSON object; otherwise nothing is
/// built and [`InvalidPayload`] is returned.
pub fn build_environment(input: &EnvInput<'_>) -> Result<Environment, InvalidPayload> {
    validate_payload(input.payload)?;

    let mut env = Environment::new();
    env.insert("METHOD".to_string(), input.method.to_string());
    env.insert("ROUTE".to_string(), input.route.to_string());
    env.insert(
        "PAYLOAD".to_string(),
        String::from_utf8_lossy(input.payload).into_owned(),
    );
    env.insert("REQUEST_URL".to_string(), input.request_url.to_string());

    for config in [input.app_config, input.route_config] {
        for (key, value) in config {
            env.insert(format!("CONFIG_{}", key.to_uppercase()), value.clone());
        }
    }

    for param in input.params {
        env.insert(
            format!("PARAM_{}", param.key.to_uppercase()),
            param.value.clone(),
        );
    }

    let mut headers: HashMap<String, Vec<&str>> = HashMap::new();
    for (name, value) in input.headers {
        headers
            .entry(format!("HEADER_{}", normalize_header(name)))
            .or_default()
            .push(value);
    }
    for (key, values) in headers {
        env.insert(key, values.join(" "));
    }

    Ok(env)
}

fn validate_payload(payload: &[u8]) -> Result<(), InvalidPayload> {
    if payload.is_empty() {
        return Ok(());
    }
    serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(payload)
        .map(|_| ())
        .map_err(|e| InvalidPayload {
            message: e.to_string(),
        })
}

/// Upper-case a header name and replace everything that is not ASCII
/// alphanumeric with `_`.
fn normalize_header(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
