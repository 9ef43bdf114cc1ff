use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json_path::JsonPath;

use crate::config::ConfigError;

/// Value pulled out of a response for one configured path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extracted {
    pub path: String,
    pub value: Option<Value>,
}

/// Compiled set of JSON path expressions, kept in configured order.
#[derive(Debug, Clone, Default)]
pub struct JsonPaths {
    paths: Vec<(String, JsonPath)>,
}

impl JsonPaths {
    /// Parse every expression. Bare dotted paths such as `data.id` are
    /// rooted at `$.`.
    pub fn compile(paths: &[String]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(paths.len());
        for raw in paths {
            let rooted = if raw.starts_with('$') {
                raw.clone()
            } else {
                format!("$.{raw}")
            };
            let path = JsonPath::parse(&rooted).map_err(|e| ConfigError::InvalidJsonPath {
                path: raw.clone(),
                reason: e.to_string(),
            })?;
            compiled.push((raw.clone(), path));
        }
        Ok(Self { paths: compiled })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(|(raw, _)| raw.as_str())
    }

    /// First match per path, or absent.
    pub fn extract(&self, document: &Value) -> Vec<Extracted> {
        self.paths
            .iter()
            .map(|(raw, path)| Extracted {
                path: raw.clone(),
                value: path.query(document).first().cloned(),
            })
            .collect()
    }

    /// Parse `body` as JSON and extract. A body that is not JSON yields
    /// absent for every path.
    pub fn extract_text(&self, body: &str) -> Vec<Extracted> {
        match serde_json::from_str::<Value>(body) {
            Ok(document) => self.extract(&document),
            Err(_) => self.absent(),
        }
    }

    pub fn absent(&self) -> Vec<Extracted> {
        self.paths
            .iter()
            .map(|(raw, _)| Extracted {
                path: raw.clone(),
                value: None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(raw: &[&str]) -> JsonPaths {
        let owned: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
        JsonPaths::compile(&owned).unwrap()
    }

    #[test]
    fn test_extract_first_match() {
        let p = paths(&["$.data.id", "$.items[*].name"]);
        let doc = json!({"data": {"id": 7}, "items": [{"name": "a"}, {"name": "b"}]});

        let out = p.extract(&doc);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].path, "$.data.id");
        assert_eq!(out[0].value, Some(json!(7)));
        assert_eq!(out[1].value, Some(json!("a")));
    }

    #[test]
    fn test_bare_path_is_rooted() {
        let p = paths(&["data.id"]);
        let out = p.extract(&json!({"data": {"id": "x"}}));
        assert_eq!(out[0].path, "data.id");
        assert_eq!(out[0].value, Some(json!("x")));
    }

    #[test]
    fn test_missing_path_is_absent() {
        let p = paths(&["$.nope"]);
        let out = p.extract(&json!({"data": 1}));
        assert_eq!(out[0].value, None);
    }

    #[test]
    fn test_non_json_body_is_absent() {
        let p = paths(&["$.a", "$.b"]);
        let out = p.extract_text("not json");
        assert!(out.iter().all(|e| e.value.is_none()));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_no_paths() {
        let p = JsonPaths::default();
        assert!(p.is_empty());
        assert!(p.extract_text("{}").is_empty());
    }
}
