//! Proxy route descriptor.
//!
//! Declares which `/api/*` paths are forwarded to which backend URLs:
//!
//! ```json
//! { "routes": [ { "path": "/api/docs", "url": "/docs", "method": "GET" } ] }
//! ```

use axum::{routing::MethodRouter, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::backend::{BackendRoute, HttpMethod};
use crate::config::RoutesSource;
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyRouteEntry {
    /// Inbound path on this service, e.g. `/api/docs`
    pub path: String,
    /// Backend path relative to `API_URL`
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDescriptor {
    #[serde(default)]
    pub routes: Vec<ProxyRouteEntry>,
}

#[derive(Debug, Error)]
pub enum RouteDescriptorError {
    #[error("failed to read route descriptor {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("route descriptor is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("route {index}: path {path:?} must start with /api/")]
    PathOutsideApi { index: usize, path: String },
    #[error("route {index}: path {path:?} is reserved for authentication")]
    ReservedPath { index: usize, path: String },
    #[error("route {index}: url must not be empty")]
    EmptyUrl { index: usize },
    #[error("route {index}: {method} {path} is declared more than once")]
    Duplicate {
        index: usize,
        method: HttpMethod,
        path: String,
    },
}

/// Where a descriptor came from, for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorOrigin {
    EnvJson,
    FilePath,
    Empty,
}

impl fmt::Display for DescriptorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorOrigin::EnvJson => write!(f, "BACKEND_ROUTES_JSON"),
            DescriptorOrigin::FilePath => write!(f, "BACKEND_ROUTES_PATH"),
            DescriptorOrigin::Empty => write!(f, "none"),
        }
    }
}

fn is_auth_path(path: &str) -> bool {
    path == "/api/auth" || path.starts_with("/api/auth/")
}

impl RouteDescriptor {
    pub fn from_json(json: &str) -> Result<Self, RouteDescriptorError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RouteDescriptorError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RouteDescriptorError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), RouteDescriptorError> {
        let mut seen = HashSet::new();
        for (index, route) in self.routes.iter().enumerate() {
            if !route.path.starts_with("/api/") {
                return Err(RouteDescriptorError::PathOutsideApi {
                    index,
                    path: route.path.clone(),
                });
            }
            if is_auth_path(&route.path) {
                return Err(RouteDescriptorError::ReservedPath {
                    index,
                    path: route.path.clone(),
                });
            }
            if route.url.trim().is_empty() {
                return Err(RouteDescriptorError::EmptyUrl { index });
            }
            if !seen.insert((route.path.as_str(), route.method)) {
                return Err(RouteDescriptorError::Duplicate {
                    index,
                    method: route.method,
                    path: route.path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Add one proxy route per entry to `router`.
    ///
    /// Entries sharing a path are combined into a single method router, since
    /// axum rejects registering the same path twice.
    pub fn mount(&self, router: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
        let mut by_path: BTreeMap<&str, MethodRouter<Arc<AppState>>> = BTreeMap::new();
        for entry in &self.routes {
            let route = BackendRoute::<Value>::new(entry.url.clone())
                .method(entry.method)
                .into_method_router();
            let combined = match by_path.remove(entry.path.as_str()) {
                Some(existing) => existing.merge(route),
                None => route,
            };
            by_path.insert(entry.path.as_str(), combined);
        }

        by_path
            .into_iter()
            .fold(router, |router, (path, method_router)| {
                tracing::debug!(path = %path, "Mounting proxy route");
                router.route(path, method_router)
            })
    }
}

/// Load and validate the route descriptor from the configured source
///
/// No source means no proxy routes. The raw JSON is never logged.
pub fn load_routes(source: Option<&RoutesSource>) -> anyhow::Result<RouteDescriptor> {
    let (descriptor, origin) = match source {
        Some(RoutesSource::Json(json)) => (
            RouteDescriptor::from_json(json).map_err(|e| anyhow::anyhow!("{}", e))?,
            DescriptorOrigin::EnvJson,
        ),
        Some(RoutesSource::File(path)) => (
            RouteDescriptor::from_file(path).map_err(|e| anyhow::anyhow!("{}", e))?,
            DescriptorOrigin::FilePath,
        ),
        None => (RouteDescriptor::default(), DescriptorOrigin::Empty),
    };

    if let Err(error) = descriptor.validate() {
        tracing::error!(
            source = %origin,
            error = %error,
            "Route descriptor validation failed"
        );
        return Err(anyhow::anyhow!(
            "Route descriptor validation failed ({}): {}",
            origin,
            error
        ));
    }

    tracing::info!(
        source = %origin,
        total_routes = descriptor.routes.len(),
        "Route descriptor loaded"
    );

    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, url: &str, method: HttpMethod) -> ProxyRouteEntry {
        ProxyRouteEntry {
            path: path.to_string(),
            url: url.to_string(),
            method,
        }
    }

    #[test]
    fn test_parse_defaults_method_to_get() {
        let descriptor =
            RouteDescriptor::from_json(r#"{"routes":[{"path":"/api/docs","url":"/docs"}]}"#)
                .unwrap();
        assert_eq!(descriptor.routes, vec![entry("/api/docs", "/docs", HttpMethod::Get)]);
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_unknown_method() {
        let err = RouteDescriptor::from_json(
            r#"{"routes":[{"path":"/api/docs","url":"/docs","method":"PATCH"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RouteDescriptorError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_paths_outside_api() {
        let descriptor = RouteDescriptor {
            routes: vec![entry("/docs", "/docs", HttpMethod::Get)],
        };
        assert!(matches!(
            descriptor.validate(),
            Err(RouteDescriptorError::PathOutsideApi { index: 0, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_auth_paths() {
        let descriptor = RouteDescriptor {
            routes: vec![entry("/api/auth/session", "/session", HttpMethod::Get)],
        };
        assert!(matches!(
            descriptor.validate(),
            Err(RouteDescriptorError::ReservedPath { .. })
        ));
        assert!(!is_auth_path("/api/authors"));
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        let descriptor = RouteDescriptor {
            routes: vec![entry("/api/docs", " ", HttpMethod::Get)],
        };
        assert!(matches!(
            descriptor.validate(),
            Err(RouteDescriptorError::EmptyUrl { index: 0 })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates_but_allows_other_methods() {
        let descriptor = RouteDescriptor {
            routes: vec![
                entry("/api/docs", "/docs", HttpMethod::Get),
                entry("/api/docs", "/docs", HttpMethod::Post),
            ],
        };
        assert!(descriptor.validate().is_ok());

        let descriptor = RouteDescriptor {
            routes: vec![
                entry("/api/docs", "/docs", HttpMethod::Get),
                entry("/api/docs", "/other", HttpMethod::Get),
            ],
        };
        assert!(matches!(
            descriptor.validate(),
            Err(RouteDescriptorError::Duplicate { index: 1, .. })
        ));
    }

    #[test]
    fn test_load_routes_without_source_is_empty() {
        let descriptor = load_routes(None).unwrap();
        assert!(descriptor.routes.is_empty());
    }

    #[test]
    fn test_load_routes_from_file() {
        let temp_file = std::env::temp_dir().join("auth_bridge_test_routes.json");
        std::fs::write(
            &temp_file,
            r#"{"routes":[{"path":"/api/users","url":"/users","method":"POST"}]}"#,
        )
        .unwrap();

        let source = RoutesSource::File(temp_file.to_string_lossy().to_string());
        let descriptor = load_routes(Some(&source)).unwrap();
        assert_eq!(descriptor.routes[0].method, HttpMethod::Post);

        std::fs::remove_file(&temp_file).ok();
    }

    #[test]
    fn test_load_routes_reports_invalid_descriptor() {
        let source = RoutesSource::Json(r#"{"routes":[{"path":"/x","url":"/x"}]}"#.to_string());
        let err = load_routes(Some(&source)).unwrap_err();
        assert!(err.to_string().contains("BACKEND_ROUTES_JSON"));
    }

    #[test]
    fn test_load_routes_missing_file() {
        let source = RoutesSource::File("/nonexistent/routes.json".to_string());
        assert!(load_routes(Some(&source)).is_err());
    }
}
