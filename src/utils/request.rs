use reqwest::Url;
use serde_json::Value as JsonValue;

/// Returns the path part of `path`, without any query string or fragment.
pub fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or_default()
}

/// Matches `path` against `prefix` exactly or as a prefix ending on a segment boundary.
///
/// `/auth/login` matches `/auth/login`, `/auth/login/` and `/auth/login?next=/`, but not
/// `/auth/login-logs` nor `/system/auth/login`.
pub fn path_matches(path: &str, prefix: &str) -> bool {
    let path = strip_query(path);
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }

    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Coerces a query value to its wire form.
///
/// `null` values are omitted, strings are sent raw, everything else uses its JSON text.
pub fn query_value_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Builds the full request URL: base, API prefix, request path and encoded query.
pub fn build_url(
    base_url: &str,
    api_prefix: &str,
    path: &str,
    query: &[(String, JsonValue)],
) -> Result<Url, String> {
    let base = base_url.trim_end_matches('/');
    let prefix = api_prefix.trim_end_matches('/');
    let raw = if path.starts_with('/') {
        format!("{base}{prefix}{path}")
    } else {
        format!("{base}{prefix}/{path}")
    };

    let mut url = Url::parse(&raw).map_err(|e| format!("invalid request URL '{raw}': {e}"))?;

    let pairs: Vec<(&str, String)> = query
        .iter()
        .filter_map(|(k, v)| query_value_to_string(v).map(|v| (k.as_str(), v)))
        .collect();
    if !pairs.is_empty() {
        let mut serializer = url.query_pairs_mut();
        for (k, v) in pairs {
            serializer.append_pair(k, &v);
        }
    }

    Ok(url)
}
