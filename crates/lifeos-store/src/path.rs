use serde_json::{Map, Value};
use tracing::warn;

use crate::error::StoreError;

/// Split and validate a dotted state path.
pub fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
    if path.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let parts: Vec<&str> = path.split('.').collect();
    // "*" is the wildcard subscription key, never a writable location
    if parts.iter().any(|p| p.is_empty() || *p == "*") {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

/// Value at `path`, if every segment resolves through objects.
pub fn get_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let parts = segments(path).ok()?;
    parts
        .into_iter()
        .try_fold(root, |node, seg| node.as_object()?.get(seg))
}

/// Assign `value` at `path`, creating missing intermediate objects, and
/// return the previous value (`Null` when absent).
///
/// An intermediate that exists but is not an object is replaced by an empty
/// object.
pub fn set_at(root: &mut Value, path: &str, value: Value) -> Result<Value, StoreError> {
    let parts = segments(path)?;
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

    let mut node = ensure_object(root, path);
    for seg in parents {
        let child = node
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        node = ensure_object(child, path);
    }
    Ok(node.insert(last.to_string(), value).unwrap_or(Value::Null))
}

fn ensure_object<'a>(node: &'a mut Value, path: &str) -> &'a mut Map<String, Value> {
    if !node.is_object() {
        warn!(path, replaced = %node, "non-object intermediate replaced on write");
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn rejects_empty_segments() {
        assert!(segments("").is_err());
        assert!(segments("a..b").is_err());
        assert!(segments(".a").is_err());
        assert!(segments("a.").is_err());
        assert!(segments("*").is_err());
        assert_eq!(segments("a.b").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn set_creates_intermediates() {
        let mut root = json!({});
        let old = set_at(&mut root, "settings.pomodoro.work", json!(25)).unwrap();
        assert_eq!(old, Value::Null);
        assert_eq!(root, json!({"settings": {"pomodoro": {"work": 25}}}));
    }

    #[test]
    fn set_returns_previous() {
        let mut root = json!({"currentTab": "inicio"});
        let old = set_at(&mut root, "currentTab", json!("metas")).unwrap();
        assert_eq!(old, json!("inicio"));
        assert_eq!(get_at(&root, "currentTab"), Some(&json!("metas")));
    }

    #[test]
    fn set_replaces_non_object_intermediate() {
        let mut root = json!({"settings": 3});
        set_at(&mut root, "settings.theme", json!("light")).unwrap();
        assert_eq!(root, json!({"settings": {"theme": "light"}}));
    }

    #[test]
    fn get_missing_or_through_scalar() {
        let root = json!({"a": {"b": 1}, "n": 5});
        assert_eq!(get_at(&root, "a.b"), Some(&json!(1)));
        assert_eq!(get_at(&root, "a.c"), None);
        assert_eq!(get_at(&root, "n.x"), None);
        assert_eq!(get_at(&root, ""), None);
    }

    fn arb_path() -> impl Strategy<Value = String> {
        proptest::collection::vec("[a-zA-Z][a-zA-Z0-9_]{0,6}", 1..4).prop_map(|s| s.join("."))
    }

    proptest! {
        #[test]
        fn set_then_get_round_trips(path in arb_path(), n in any::<i64>(), s in "[a-z]{0,8}") {
            let mut root = json!({"tasks": [], "settings": {"theme": "dark"}});
            let value = json!({"n": n, "s": s});
            set_at(&mut root, &path, value.clone()).unwrap();
            prop_assert_eq!(get_at(&root, &path), Some(&value));
        }
    }
}
