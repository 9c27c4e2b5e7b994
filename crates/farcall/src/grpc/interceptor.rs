//! Metadata interceptor: extracts credentials from call metadata into a
//! call-scoped [`CredentialContext`].
//!
//! Always runs; never rejects. Authorization decisions happen in the
//! authenticator after the registry has resolved the target.

use tonic::{Request, Status};
use tracing::debug;

use crate::auth::CredentialContext;

/// Standard authorization header carrying the bearer token.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Build the interceptor closure. The key header name comes from
/// configuration (`x-api-key` by default).
pub fn credentials(
    key_header: String,
) -> impl FnMut(Request<()>) -> Result<Request<()>, Status> + Clone {
    move |mut request: Request<()>| {
        let metadata = request.metadata();

        // Accept "Bearer <token>" and raw tokens alike.
        let token = metadata
            .get(AUTHORIZATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|raw| raw.strip_prefix("Bearer ").unwrap_or(raw).trim().to_owned())
            .filter(|token| !token.is_empty());

        let key = metadata
            .get(key_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(|raw| raw.trim().to_owned())
            .filter(|key| !key.is_empty());

        debug!(
            "farcall: interceptor -> token={} key={}",
            if token.is_some() { "[present]" } else { "[absent]" },
            if key.is_some() { "[present]" } else { "[absent]" },
        );

        request
            .extensions_mut()
            .insert(CredentialContext { token, key });
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataValue;

    fn intercept(token: Option<&str>, key: Option<&str>) -> CredentialContext {
        let mut request = Request::new(());
        if let Some(token) = token {
            request
                .metadata_mut()
                .insert(AUTHORIZATION_HEADER, MetadataValue::try_from(token).unwrap());
        }
        if let Some(key) = key {
            request
                .metadata_mut()
                .insert("x-api-key", MetadataValue::try_from(key).unwrap());
        }
        let request = credentials("x-api-key".to_owned())(request).unwrap();
        request.extensions().get::<CredentialContext>().cloned().unwrap()
    }

    #[test]
    fn test_bearer_prefix_stripped() {
        let creds = intercept(Some("Bearer abc.def.ghi"), None);
        assert_eq!(creds.token.as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_raw_token_accepted() {
        let creds = intercept(Some("abc.def.ghi"), None);
        assert_eq!(creds.token.as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_token_whitespace_trimmed() {
        let creds = intercept(Some("Bearer   abc.def.ghi  "), None);
        assert_eq!(creds.token.as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_key_extracted() {
        let creds = intercept(None, Some("  k1 "));
        assert_eq!(creds.key.as_deref(), Some("k1"));
        assert!(creds.token.is_none());
    }

    #[test]
    fn test_absent_headers_leave_empty_context() {
        let creds = intercept(None, None);
        assert!(!creds.has_token());
        assert!(!creds.has_key());
    }

    #[test]
    fn test_blank_header_treated_as_absent() {
        let creds = intercept(Some("   "), Some(""));
        assert!(!creds.has_token());
        assert!(!creds.has_key());
    }
}
