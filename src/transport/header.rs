use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::GoxError;

/// `Content-Type: application/json`
#[must_use]
pub fn content_type_json() -> (HeaderName, HeaderValue) {
    (CONTENT_TYPE, HeaderValue::from_static("application/json"))
}

/// `Authorization: Bearer {token}`, marked sensitive.
///
/// # Errors
///
/// Returns [`GoxError::InvalidRequest`] when the token contains bytes that
/// are not allowed in a header value.
pub fn authorization(token: &str) -> Result<(HeaderName, HeaderValue), GoxError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| GoxError::InvalidRequest(format!("Invalid authorization token: {e}")))?;
    value.set_sensitive(true);
    Ok((AUTHORIZATION, value))
}

/// Collect header pairs into a map, appending repeated names.
#[must_use]
pub fn header_map<I>(pairs: I) -> HeaderMap
where
    I: IntoIterator<Item = (HeaderName, HeaderValue)>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        headers.append(name, value);
    }
    headers
}
