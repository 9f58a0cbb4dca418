use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const LIMIT: &str = "limit";
pub const FIELDS: &str = "fields";

/// Item query parameters, sent as the URL query string of a read request.
///
/// The default query reads everything: `limit=-1&fields=*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Map<String, Value>);
impl Query {
    pub fn new(params: Map<String, Value>) -> Self {
        Self(params)
    }

    /// Fill in `limit=-1` when the query does not set a limit, so a read
    /// is never silently paginated.
    pub fn with_default_limit(mut self) -> Self {
        self.0.entry(LIMIT).or_insert(Value::from(-1));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Flatten the parameters into URL query pairs: arrays become comma
    /// separated lists, objects (filters, deep queries) are sent as JSON and
    /// `null` parameters are left out.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    Value::Null => return None,
                    Value::String(s) => s.clone(),
                    Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(","),
                    other => scalar(other),
                };
                Some((key.clone(), value))
            })
            .collect()
    }
}
impl Default for Query {
    fn default() -> Self {
        let mut params = Map::new();
        params.insert(LIMIT.to_string(), Value::from(-1));
        params.insert(FIELDS.to_string(), Value::from("*"));
        Self(params)
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(value: Value) -> Query {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_default_reads_everything() {
        let pairs = Query::default().to_pairs();
        assert_eq!(pairs, [("limit".to_string(), "-1".to_string()), ("fields".to_string(), "*".to_string())]);
    }

    #[test]
    fn test_missing_limit_is_filled() {
        let q = query(json!({"fields": "title"})).with_default_limit();
        assert_eq!(q.get(LIMIT), Some(&json!(-1)));

        let q = query(json!({"limit": 10})).with_default_limit();
        assert_eq!(q.get(LIMIT), Some(&json!(10)));
        assert_eq!(q.get(FIELDS), None);
    }

    #[test]
    fn test_pairs_flatten_nested_values() {
        let q = query(json!({
            "fields": ["*", "author.*"],
            "filter": {"status": {"_eq": "published"}},
            "sort": null,
            "limit": -1,
        }));
        assert_eq!(
            q.to_pairs(),
            [
                ("fields".to_string(), "*,author.*".to_string()),
                ("filter".to_string(), r#"{"status":{"_eq":"published"}}"#.to_string()),
                ("limit".to_string(), "-1".to_string()),
            ]
        );
    }
}
