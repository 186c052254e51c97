//! Organization identity discovery.
//!
//! When no organization id is known, the chain queries account-bootstrap
//! endpoints and extracts an identifier through a priority list of named
//! shape adapters. Unknown shapes fail closed into a parse failure; nothing
//! ever silently defaults.

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::FetchError;

// ============================================================================
// Constants
// ============================================================================

/// Bootstrap endpoints queried in order.
pub const BOOTSTRAP_ENDPOINTS: &[&str] = &["/api/bootstrap", "/api/account"];

// ============================================================================
// Shape Adapters
// ============================================================================

/// A named adapter for one known bootstrap response shape.
///
/// Adapters are tried in priority order; the first to yield a non-empty id
/// wins. Each is versioned by name so log lines identify which shape a
/// deployment is serving.
struct ShapeAdapter {
    name: &'static str,
    extract: fn(&Value) -> Option<String>,
}

const SHAPE_ADAPTERS: &[ShapeAdapter] = &[
    // {"account": {"memberships": [{"organization": {"uuid": ...}}]}}
    ShapeAdapter {
        name: "memberships_v1",
        extract: |v| {
            v.get("account")?
                .get("memberships")?
                .as_array()?
                .first()?
                .get("organization")
                .and_then(org_identifier)
        },
    },
    // {"organizations": [{"uuid": ...}]}
    ShapeAdapter {
        name: "organizations_v1",
        extract: |v| v.get("organizations")?.as_array()?.first().and_then(org_identifier),
    },
    // {"organization": {"uuid": ...}} or {"account": {"organization": ...}}
    ShapeAdapter {
        name: "organization_v1",
        extract: |v| {
            v.get("organization")
                .or_else(|| v.get("account")?.get("organization"))
                .and_then(org_identifier)
        },
    },
    // {"org_id": "..."} or {"organization_id": "..."}
    ShapeAdapter {
        name: "flat_v1",
        extract: |v| {
            v.get("org_id")
                .or_else(|| v.get("organization_id"))
                .and_then(Value::as_str)
                .map(str::to_string)
        },
    },
];

/// Reads the identifier from an organization object (`uuid` or `id`).
fn org_identifier(org: &Value) -> Option<String> {
    org.get("uuid")
        .or_else(|| org.get("id"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extracts an organization id from a bootstrap body.
///
/// Returns the winning adapter's name alongside the id.
pub fn extract_org_id(body: &Value) -> Option<(&'static str, String)> {
    for adapter in SHAPE_ADAPTERS {
        if let Some(id) = (adapter.extract)(body) {
            return Some((adapter.name, id));
        }
    }
    None
}

// ============================================================================
// Discovery Client
// ============================================================================

/// Client for the account-bootstrap endpoints.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http: reqwest::Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl DiscoveryClient {
    /// Creates a new discovery client.
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        session_cookie: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            session_cookie,
        }
    }

    /// Queries the bootstrap endpoints in order and extracts an org id.
    ///
    /// # Errors
    ///
    /// - `FetchError::AuthRequired` if any endpoint returns 401/403
    /// - `FetchError::Parse` when every reachable endpoint responds with an
    ///   unrecognized shape
    /// - `FetchError::InvalidResponse` when no endpoint responds usefully
    #[instrument(skip(self))]
    pub async fn discover_org_id(&self) -> Result<String, FetchError> {
        let mut saw_unknown_shape = false;

        for endpoint in BOOTSTRAP_ENDPOINTS {
            let url = format!("{}{}", self.base_url, endpoint);
            debug!(url = %url, "Querying bootstrap endpoint");

            let mut request = self.http.get(&url).header("Accept", "application/json");
            if let Some(ref cookie) = self.session_cookie {
                request = request.header("Cookie", cookie.clone());
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(url = %url, error = %e, "Bootstrap request failed");
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return Err(FetchError::AuthRequired(format!(
                    "bootstrap endpoint returned {status}"
                )));
            }
            if !status.is_success() {
                warn!(url = %url, status = %status, "Bootstrap endpoint unavailable");
                continue;
            }

            let body: Value = match response.json().await {
                Ok(v) => v,
                Err(e) => {
                    warn!(url = %url, error = %e, "Bootstrap body unparseable");
                    continue;
                }
            };

            match extract_org_id(&body) {
                Some((shape, id)) => {
                    debug!(shape = shape, "Organization id discovered");
                    return Ok(id);
                }
                None => {
                    warn!(url = %url, "Bootstrap response shape not recognized");
                    saw_unknown_shape = true;
                }
            }
        }

        if saw_unknown_shape {
            Err(FetchError::Parse(
                "no bootstrap response matched a known shape".to_string(),
            ))
        } else {
            Err(FetchError::InvalidResponse(
                "no bootstrap endpoint responded".to_string(),
            ))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memberships_shape_wins() {
        let body = json!({
            "account": {
                "memberships": [
                    {"organization": {"uuid": "org-from-membership"}}
                ]
            },
            "organizations": [{"uuid": "org-from-list"}]
        });

        let (shape, id) = extract_org_id(&body).unwrap();
        assert_eq!(shape, "memberships_v1");
        assert_eq!(id, "org-from-membership");
    }

    #[test]
    fn test_organizations_list_shape() {
        let body = json!({"organizations": [{"id": "org-123"}]});
        let (shape, id) = extract_org_id(&body).unwrap();
        assert_eq!(shape, "organizations_v1");
        assert_eq!(id, "org-123");
    }

    #[test]
    fn test_flat_shape() {
        let body = json!({"organization_id": "org-flat"});
        let (shape, id) = extract_org_id(&body).unwrap();
        assert_eq!(shape, "flat_v1");
        assert_eq!(id, "org-flat");
    }

    #[test]
    fn test_nested_account_organization() {
        let body = json!({"account": {"organization": {"id": "org-nested"}}});
        let (shape, id) = extract_org_id(&body).unwrap();
        assert_eq!(shape, "organization_v1");
        assert_eq!(id, "org-nested");
    }

    #[test]
    fn test_unknown_shape_fails_closed() {
        let body = json!({"user": {"email": "a@b.c"}, "plan": "pro"});
        assert!(extract_org_id(&body).is_none());
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let body = json!({"organizations": [{"uuid": ""}]});
        assert!(extract_org_id(&body).is_none());
    }
}
