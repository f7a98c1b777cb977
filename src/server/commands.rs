//! Command Dispatch
//!
//! Maps one wire request to one facade call. Errors never escape: every
//! failure becomes an `{"ok":false}` response for the connection task to
//! write back.

use serde_json::{json, Value};

use crate::cache::Cache;
use crate::models::{WireRequest, WireResponse};

/// Executes a request against the cache and shapes the response.
pub fn dispatch(cache: &Cache, request: WireRequest) -> WireResponse {
    match execute(cache, request) {
        Ok(value) => WireResponse::success(value),
        Err(error) => WireResponse::failure(error),
    }
}

fn execute(cache: &Cache, request: WireRequest) -> Result<Value, String> {
    let ns = request.namespace.as_deref();
    match request.cmd.as_str() {
        "read" => {
            let key = require_key(&request)?;
            let value: Option<Value> = cache.read(key, ns).map_err(stringify)?;
            Ok(value.unwrap_or(Value::Null))
        }
        "write" => {
            let key = require_key(&request)?;
            let value = request
                .value
                .as_ref()
                .ok_or("'write' requires 'value'")?;
            cache
                .write(key, value, request.ttl, ns)
                .map_err(stringify)?;
            Ok(Value::Bool(true))
        }
        "delete" => {
            let key = require_key(&request)?;
            cache.delete(key, ns).map_err(stringify)?;
            Ok(Value::Bool(true))
        }
        "exists" => {
            let key = require_key(&request)?;
            Ok(Value::Bool(cache.exists(key, ns).map_err(stringify)?))
        }
        "fetch" => {
            // A remote caller cannot supply a block, so a miss writes and
            // returns the provided fallback value
            let key = require_key(&request)?;
            if let Some(value) = cache.read::<Value>(key, ns).map_err(stringify)? {
                return Ok(value);
            }
            let fallback = request.fallback.clone().ok_or("'fetch' requires 'fallback'")?;
            cache
                .write(key, &fallback, request.ttl, ns)
                .map_err(stringify)?;
            Ok(fallback)
        }
        "inspect" => {
            let key = require_key(&request)?;
            match cache.inspect(key, ns).map_err(stringify)? {
                Some(info) => serde_json::to_value(info).map_err(stringify),
                None => Ok(Value::Null),
            }
        }
        "keys" => {
            let ns = require_namespace(&request)?;
            let keys = cache.keys(ns).map_err(stringify)?;
            serde_json::to_value(keys).map_err(stringify)
        }
        "clear_namespace" => {
            let ns = require_namespace(&request)?;
            cache.clear_namespace(ns).map_err(stringify)?;
            Ok(Value::Bool(true))
        }
        "least_touched" => {
            let limit = request.limit.unwrap_or(10);
            let entries: Vec<Value> = cache
                .least_touched(limit)
                .into_iter()
                .map(|(key, touches)| json!({"key": key, "touches": touches}))
                .collect();
            Ok(Value::Array(entries))
        }
        "all_keys" => serde_json::to_value(cache.all_keys()).map_err(stringify),
        "current_memory_bytes" => Ok(json!(cache.total_bytes())),
        "max_memory_bytes" => Ok(json!(cache.max_bytes())),
        "metrics" => match request.namespace.as_deref() {
            Some(ns) => {
                serde_json::to_value(cache.namespace_metrics(ns).map_err(stringify)?)
                    .map_err(stringify)
            }
            None => serde_json::to_value(cache.metrics()).map_err(stringify),
        },
        other => Err(format!("unknown command '{}'", other)),
    }
}

fn stringify<E: std::fmt::Display>(e: E) -> String {
    e.to_string()
}

fn require_key(request: &WireRequest) -> Result<&str, String> {
    request
        .key
        .as_deref()
        .ok_or_else(|| format!("'{}' requires 'key'", request.cmd))
}

fn require_namespace(request: &WireRequest) -> Result<&str, String> {
    request
        .namespace
        .as_deref()
        .ok_or_else(|| format!("'{}' requires 'namespace'", request.cmd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_cache() -> Cache {
        Cache::new(Config {
            shard_count: 1,
            sweep_interval: None,
            ..Config::default()
        })
        .unwrap()
    }

    fn request(line: &str) -> WireRequest {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let cache = test_cache();
        let resp = dispatch(&cache, request(r#"{"cmd":"write","key":"k","value":"hello"}"#));
        assert!(resp.ok);

        let resp = dispatch(&cache, request(r#"{"cmd":"read","key":"k"}"#));
        assert!(resp.ok);
        assert_eq!(resp.value, Some(json!("hello")));
    }

    #[test]
    fn test_read_miss_returns_null() {
        let cache = test_cache();
        let resp = dispatch(&cache, request(r#"{"cmd":"read","key":"missing"}"#));
        assert!(resp.ok);
        assert_eq!(resp.value, Some(Value::Null));
    }

    #[test]
    fn test_delete_and_exists() {
        let cache = test_cache();
        dispatch(&cache, request(r#"{"cmd":"write","key":"k","value":1}"#));
        let resp = dispatch(&cache, request(r#"{"cmd":"exists","key":"k"}"#));
        assert_eq!(resp.value, Some(json!(true)));

        dispatch(&cache, request(r#"{"cmd":"delete","key":"k"}"#));
        let resp = dispatch(&cache, request(r#"{"cmd":"exists","key":"k"}"#));
        assert_eq!(resp.value, Some(json!(false)));
    }

    #[test]
    fn test_fetch_writes_fallback_on_miss() {
        let cache = test_cache();
        let resp = dispatch(
            &cache,
            request(r#"{"cmd":"fetch","key":"k","fallback":"computed"}"#),
        );
        assert_eq!(resp.value, Some(json!("computed")));

        // The fallback is now cached
        let resp = dispatch(&cache, request(r#"{"cmd":"read","key":"k"}"#));
        assert_eq!(resp.value, Some(json!("computed")));
    }

    #[test]
    fn test_fetch_prefers_cached_value() {
        let cache = test_cache();
        dispatch(&cache, request(r#"{"cmd":"write","key":"k","value":"cached"}"#));
        let resp = dispatch(
            &cache,
            request(r#"{"cmd":"fetch","key":"k","fallback":"ignored"}"#),
        );
        assert_eq!(resp.value, Some(json!("cached")));
    }

    #[test]
    fn test_namespaced_commands() {
        let cache = test_cache();
        dispatch(
            &cache,
            request(r#"{"cmd":"write","key":"k","value":1,"namespace":"app"}"#),
        );
        let resp = dispatch(&cache, request(r#"{"cmd":"keys","namespace":"app"}"#));
        assert_eq!(resp.value, Some(json!(["k"])));

        let resp = dispatch(&cache, request(r#"{"cmd":"clear_namespace","namespace":"app"}"#));
        assert!(resp.ok);
        let resp = dispatch(&cache, request(r#"{"cmd":"keys","namespace":"app"}"#));
        assert_eq!(resp.value, Some(json!([])));
    }

    #[test]
    fn test_memory_commands() {
        let cache = test_cache();
        dispatch(&cache, request(r#"{"cmd":"write","key":"k","value":"xyz"}"#));
        let resp = dispatch(&cache, request(r#"{"cmd":"current_memory_bytes"}"#));
        assert!(resp.value.unwrap().as_u64().unwrap() > 0);

        let resp = dispatch(&cache, request(r#"{"cmd":"max_memory_bytes"}"#));
        assert_eq!(resp.value, Some(json!(crate::config::DEFAULT_MAX_BYTES)));
    }

    #[test]
    fn test_metrics_command() {
        let cache = test_cache();
        dispatch(&cache, request(r#"{"cmd":"read","key":"missing"}"#));
        let resp = dispatch(&cache, request(r#"{"cmd":"metrics"}"#));
        let metrics = resp.value.unwrap();
        assert_eq!(metrics["misses"], json!(1));
        assert!(metrics["shards"].is_array());

        let resp = dispatch(&cache, request(r#"{"cmd":"metrics","namespace":"app"}"#));
        assert_eq!(resp.value.unwrap()["namespace"], json!("app"));
    }

    #[test]
    fn test_least_touched_command() {
        let cache = test_cache();
        dispatch(&cache, request(r#"{"cmd":"write","key":"hot","value":1}"#));
        dispatch(&cache, request(r#"{"cmd":"write","key":"cold","value":1}"#));
        dispatch(&cache, request(r#"{"cmd":"read","key":"hot"}"#));

        let resp = dispatch(&cache, request(r#"{"cmd":"least_touched","limit":1}"#));
        assert_eq!(
            resp.value,
            Some(json!([{"key": "cold", "touches": 0}]))
        );
    }

    #[test]
    fn test_unknown_command() {
        let cache = test_cache();
        let resp = dispatch(&cache, request(r#"{"cmd":"flushdb"}"#));
        assert!(!resp.ok);
        assert!(resp.error.unwrap().contains("flushdb"));
    }

    #[test]
    fn test_missing_required_fields() {
        let cache = test_cache();
        let resp = dispatch(&cache, request(r#"{"cmd":"read"}"#));
        assert!(!resp.ok);

        let resp = dispatch(&cache, request(r#"{"cmd":"write","key":"k"}"#));
        assert!(!resp.ok);

        let resp = dispatch(&cache, request(r#"{"cmd":"keys"}"#));
        assert!(!resp.ok);
    }
}
