//! Permission predicates evaluated against token claims.
//!
//! A filter receives the permission name and its claim value and returns
//! whether the value satisfies the requirement. Absent values (a missing
//! claim or an explicit JSON `null`) never reach a filter; the authorizer
//! rejects them first.
use serde_json::Value;
use std::sync::Arc;

pub type PermissionFilter = Arc<dyn Fn(&str, &Value) -> bool + Send + Sync>;

/// `true` when a claim value should be treated as not present.
pub fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

pub fn permission_equals(required: impl Into<Value>) -> PermissionFilter {
    let required = required.into();
    Arc::new(move |_name: &str, value: &Value| *value == required)
}

pub fn permission_not_equals(rejected: impl Into<Value>) -> PermissionFilter {
    let rejected = rejected.into();
    Arc::new(move |_name: &str, value: &Value| *value != rejected)
}

pub fn permission_exists() -> PermissionFilter {
    Arc::new(|_name: &str, value: &Value| !is_absent(Some(value)))
}

/// Matches string claim values against a `*` wildcard pattern, e.g.
/// `reports:*`. Non-string values never match.
pub fn permission_matches(pattern: impl Into<String>) -> PermissionFilter {
    let pattern = pattern.into();
    Arc::new(move |_name: &str, value: &Value| {
        value
            .as_str()
            .is_some_and(|value| wildcard_match(&pattern, value))
    })
}

pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let pattern = pattern.as_bytes();
    let value = value.as_bytes();
    let (mut p, mut v) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while v < value.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, v));
                p += 1;
            }
            Some(byte) if *byte == value[v] => {
                p += 1;
                v += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    v = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|byte| *byte == b'*')
}
