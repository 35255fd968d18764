//! Route lookup for declarative endpoints.
//!
//! # Responsibilities
//! - Compile endpoint definitions into a path trie
//! - Extract named path variables
//! - Distinguish an unknown path from a known path with the wrong method
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - One trie entry per path pattern, methods resolved per entry
//! - Explicit NotFound / MethodNotAllowed rather than silent default
//! - Matching runs on the raw path; each captured variable is then
//!   percent-decoded, lossily when the bytes are not UTF-8

use std::collections::BTreeMap;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use thiserror::Error;

use crate::config::schema::EndpointConfig;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route {path}: {source}")]
    Insert {
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}

/// Outcome of a route lookup.
#[derive(Debug, Clone)]
pub enum RouteMatch {
    Matched {
        endpoint: Arc<EndpointConfig>,
        vars: BTreeMap<String, String>,
    },
    MethodNotAllowed,
    NotFound,
}

#[derive(Debug)]
struct PathEntry {
    methods: Vec<(String, Arc<EndpointConfig>)>,
}

/// Compiled routing table for one transport.
#[derive(Debug)]
pub struct EndpointRouter {
    trie: matchit::Router<usize>,
    entries: Vec<PathEntry>,
}

impl EndpointRouter {
    /// Compile a routing table. Methods are matched case-insensitively.
    pub fn build(endpoints: &[EndpointConfig]) -> Result<Self, RouteError> {
        let mut trie = matchit::Router::new();
        let mut entries: Vec<PathEntry> = Vec::new();
        let mut index_by_path: BTreeMap<&str, usize> = BTreeMap::new();

        for endpoint in endpoints {
            let method = endpoint.method.to_ascii_uppercase();
            let shared = Arc::new(endpoint.clone());

            match index_by_path.get(endpoint.path.as_str()) {
                Some(&index) => entries[index].methods.push((method, shared)),
                None => {
                    let index = entries.len();
                    trie.insert(endpoint.path.clone(), index).map_err(|source| RouteError::Insert {
                        path: endpoint.path.clone(),
                        source,
                    })?;
                    index_by_path.insert(endpoint.path.as_str(), index);
                    entries.push(PathEntry {
                        methods: vec![(method, shared)],
                    });
                }
            }
        }

        Ok(Self { trie, entries })
    }

    /// Look up `path` for `method`.
    pub fn lookup(&self, method: &str, path: &str) -> RouteMatch {
        let matched = match self.trie.at(path) {
            Ok(matched) => matched,
            Err(_) => return RouteMatch::NotFound,
        };

        let Some(entry) = self.entries.get(*matched.value) else {
            return RouteMatch::NotFound;
        };

        let endpoint = entry
            .methods
            .iter()
            .find(|(m, _)| m.eq_ignore_ascii_case(method))
            .map(|(_, endpoint)| endpoint.clone());

        match endpoint {
            Some(endpoint) => {
                let vars = matched
                    .params
                    .iter()
                    .map(|(name, value)| {
                        let decoded = percent_decode_str(value).decode_utf8_lossy();
                        (name.to_string(), decoded.into_owned())
                    })
                    .collect();
                RouteMatch::Matched { endpoint, vars }
            }
            None => RouteMatch::MethodNotAllowed,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.methods.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ResponseConfig;

    fn endpoint(path: &str, method: &str, body: &str) -> EndpointConfig {
        EndpointConfig {
            path: path.to_string(),
            method: method.to_string(),
            response: ResponseConfig {
                body: body.to_string(),
                ..ResponseConfig::default()
            },
        }
    }

    #[test]
    fn test_variables_extracted() {
        let router = EndpointRouter::build(&[endpoint("/sensor/{id}/reading/{kind}", "POST", "")]).unwrap();

        match router.lookup("POST", "/sensor/7/reading/temp") {
            RouteMatch::Matched { vars, .. } => {
                assert_eq!(vars.get("id").map(String::as_str), Some("7"));
                assert_eq!(vars.get("kind").map(String::as_str), Some("temp"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_variables_are_percent_decoded() {
        let router = EndpointRouter::build(&[endpoint("/sensor/{id}", "POST", "")]).unwrap();

        let vars = |path: &str| match router.lookup("POST", path) {
            RouteMatch::Matched { vars, .. } => vars["id"].clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(vars("/sensor/a%20b"), "a b");
        assert_eq!(vars("/sensor/caf%C3%A9"), "café");
        // An encoded slash stays inside the one segment.
        assert_eq!(vars("/sensor/a%2Fb"), "a/b");
        assert_eq!(vars("/sensor/bad%FF"), "bad\u{FFFD}");
    }

    #[test]
    fn test_method_dispatch_on_shared_path() {
        let router = EndpointRouter::build(&[
            endpoint("/data", "get", "read"),
            endpoint("/data", "POST", "write"),
        ])
        .unwrap();

        assert_eq!(router.len(), 2);
        match router.lookup("GET", "/data") {
            RouteMatch::Matched { endpoint, .. } => assert_eq!(endpoint.response.body, "read"),
            other => panic!("unexpected {:?}", other),
        }
        match router.lookup("post", "/data") {
            RouteMatch::Matched { endpoint, .. } => assert_eq!(endpoint.response.body, "write"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(router.lookup("DELETE", "/data"), RouteMatch::MethodNotAllowed));
    }

    #[test]
    fn test_unknown_path() {
        let router = EndpointRouter::build(&[endpoint("/a", "GET", "")]).unwrap();
        assert!(matches!(router.lookup("GET", "/b"), RouteMatch::NotFound));
        assert!(matches!(router.lookup("GET", "/a/extra"), RouteMatch::NotFound));
    }

    #[test]
    fn test_empty_router() {
        let router = EndpointRouter::build(&[]).unwrap();
        assert!(router.is_empty());
        assert!(matches!(router.lookup("GET", "/"), RouteMatch::NotFound));
    }

    #[test]
    fn test_conflicting_variables_rejected() {
        let result = EndpointRouter::build(&[endpoint("/s/{id}", "GET", ""), endpoint("/s/{name}", "GET", "")]);
        assert!(matches!(result, Err(RouteError::Insert { .. })));
    }
}
