//! Route documents as understood by the proxy admin API

use std::collections::BTreeSet;

use serde_json::{json, Value};

/// Deterministic route id for a domain, e.g. `site_example_com`
pub fn route_id(domain: &str) -> String {
    format!("site_{}", domain.replace('.', "_"))
}

/// Route binding `domain` to a static file server rooted at `root`
pub fn site_route(domain: &str, root: &str) -> Value {
    json!({
        "@id": route_id(domain),
        "match": [{ "host": [domain] }],
        "handle": [{
            "handler": "subroute",
            "routes": [{
                "handle": [{
                    "handler": "file_server",
                    "root": root
                }]
            }]
        }]
    })
}

/// File server root of a route created by [`site_route`]
pub fn served_root(route: &Value) -> Option<&str> {
    route
        .pointer("/handle/0/routes/0/handle/0/root")
        .and_then(Value::as_str)
}

/// Every host matched by a route
pub fn route_hosts(route: &Value) -> BTreeSet<String> {
    route
        .get("match")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|matcher| matcher.get("host").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

/// Domains whose route currently serves exactly `root`
pub fn domains_serving(routes: &[Value], root: &str) -> BTreeSet<String> {
    routes
        .iter()
        .filter(|route| served_root(route) == Some(root))
        .flat_map(route_hosts)
        .collect()
}

/// Whether `existing` already routes `domain` (and only it) to `root`
pub fn is_equivalent(existing: &Value, domain: &str, root: &str) -> bool {
    let hosts = route_hosts(existing);
    served_root(existing) == Some(root) && hosts.len() == 1 && hosts.contains(domain)
}
