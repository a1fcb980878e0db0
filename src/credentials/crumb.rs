use super::{AntiForgeryIssuer, AntiForgeryToken, CredentialError, SecretMaterial};
use crate::shared::http::{classify_error, http_agent, join_url, HttpFailure};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrumbResponse {
    crumb_request_field: String,
    crumb: String,
}

/// Requests a CSRF crumb from `<base_url>/crumbIssuer/api/json`.
///
/// Jenkins ties crumbs to the web session, so the session cookie set on the
/// crumb response is captured alongside it.
#[derive(Debug, Clone)]
pub struct JenkinsCrumbIssuer {
    base_url: String,
    timeout: Duration,
}

impl JenkinsCrumbIssuer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl AntiForgeryIssuer for JenkinsCrumbIssuer {
    fn issue(&self, secret: &SecretMaterial) -> Result<AntiForgeryToken, CredentialError> {
        let url = join_url(&self.base_url, "crumbIssuer/api/json");
        let response = http_agent(self.timeout)
            .get(&url)
            .set("Authorization", &secret.basic_auth_header())
            .call()
            .map_err(|err| match classify_error(err) {
                HttpFailure::Status { status, .. } if status == 401 || status == 403 => {
                    CredentialError::Authentication { status }
                }
                HttpFailure::Status { status, body } => CredentialError::InvalidTokenResponse {
                    reason: format!("status {status}: {body}"),
                },
                HttpFailure::Transport(reason) => CredentialError::Unreachable { reason },
            })?;

        let session_cookie = session_cookie(&response.all("set-cookie"));
        let crumb: CrumbResponse =
            response
                .into_json()
                .map_err(|err| CredentialError::InvalidTokenResponse {
                    reason: err.to_string(),
                })?;
        if crumb.crumb.trim().is_empty() || crumb.crumb_request_field.trim().is_empty() {
            return Err(CredentialError::InvalidTokenResponse {
                reason: "crumb issuer returned an empty crumb".to_string(),
            });
        }
        Ok(AntiForgeryToken {
            field: crumb.crumb_request_field,
            value: crumb.crumb,
            session_cookie,
        })
    }
}

/// Joins the `name=value` parts of every Set-Cookie header into one Cookie value.
fn session_cookie(set_cookie_headers: &[&str]) -> Option<String> {
    let pairs: Vec<&str> = set_cookie_headers
        .iter()
        .filter_map(|header| header.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_keeps_only_name_value_pairs() {
        let cookie = session_cookie(&[
            "JSESSIONID.abc=node01; Path=/; HttpOnly",
            "remember-me=; Max-Age=0",
        ]);
        assert_eq!(cookie.as_deref(), Some("JSESSIONID.abc=node01; remember-me="));
        assert_eq!(session_cookie(&[]), None);
    }

    #[test]
    fn unreachable_issuer_maps_to_unreachable() {
        let issuer = JenkinsCrumbIssuer::new("http://127.0.0.1:9", Duration::from_millis(300));
        let err = issuer
            .issue(&SecretMaterial::new("svc", "pw"))
            .expect_err("nothing listens on the discard port");
        assert!(matches!(err, CredentialError::Unreachable { .. }));
    }
}
