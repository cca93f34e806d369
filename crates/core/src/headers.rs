//! Protocol header construction
//!
//! Pure functions: building the outbound header set after issuance or
//! rotation, reading a presented token from inbound pairs, and appending
//! the fields to a redirect URL for email-link flows. No side effects, no
//! token-set mutation.

use time::OffsetDateTime;
use url::Url;

use crate::config::HeaderNames;
use crate::error::AuthResult;

/// Token type carried in every header set.
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Identity-provider context supplied by the caller that resolved the
/// account. The engine never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderContext {
    pub provider: String,
    pub uid: String,
}

impl ProviderContext {
    pub fn new(provider: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            uid: uid.into(),
        }
    }
}

/// The header set returned to a client after issuance or rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub access_token: String,
    pub token_type: String,
    pub client: String,
    /// Stringified epoch seconds; clients use it to skip validation
    /// requests for tokens they already know are expired.
    pub expiry: String,
    pub provider: String,
    pub uid: String,
}

impl AuthHeaders {
    /// Render with the configured wire names.
    pub fn to_pairs(&self, names: &HeaderNames) -> Vec<(String, String)> {
        vec![
            (names.access_token.clone(), self.access_token.clone()),
            (names.token_type.clone(), self.token_type.clone()),
            (names.client.clone(), self.client.clone()),
            (names.expiry.clone(), self.expiry.clone()),
            (names.provider.clone(), self.provider.clone()),
            (names.uid.clone(), self.uid.clone()),
        ]
    }
}

/// Build the header set for a freshly issued or rotated secret.
pub fn build_auth_headers(
    secret: &str,
    device_id: &str,
    expiry: OffsetDateTime,
    context: &ProviderContext,
) -> AuthHeaders {
    AuthHeaders {
        access_token: secret.to_owned(),
        token_type: TOKEN_TYPE_BEARER.to_owned(),
        client: device_id.to_owned(),
        expiry: expiry.unix_timestamp().to_string(),
        provider: context.provider.clone(),
        uid: context.uid.clone(),
    }
}

/// A token presented by an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedToken {
    pub token: String,
    pub device_id: String,
}

/// Read a presented token from inbound header pairs.
///
/// `None` unless both the access-token and client values are present and
/// non-empty. Names are matched case-insensitively, as header names are.
pub fn extract_presented_token<'a, I>(pairs: I, names: &HeaderNames) -> Option<PresentedToken>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut token = None;
    let mut device_id = None;
    for (name, value) in pairs {
        if name.eq_ignore_ascii_case(&names.access_token) {
            token = Some(value);
        } else if name.eq_ignore_ascii_case(&names.client) {
            device_id = Some(value);
        }
    }
    match (token, device_id) {
        (Some(token), Some(device_id)) if !token.is_empty() && !device_id.is_empty() => {
            Some(PresentedToken {
                token: token.to_owned(),
                device_id: device_id.to_owned(),
            })
        }
        _ => None,
    }
}

/// Append the auth fields as query parameters to a redirect URL.
///
/// Used by email-link flows (confirmation, password reset) that hand the
/// client its first token via redirect instead of response headers.
pub fn build_auth_url(base: &str, headers: &AuthHeaders, names: &HeaderNames) -> AuthResult<String> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair(&names.access_token, &headers.access_token)
        .append_pair(&names.token_type, &headers.token_type)
        .append_pair(&names.client, &headers.client)
        .append_pair(&names.expiry, &headers.expiry)
        .append_pair(&names.provider, &headers.provider)
        .append_pair(&names.uid, &headers.uid);
    Ok(url.into())
}
