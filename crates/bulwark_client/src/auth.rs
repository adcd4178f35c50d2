//! Applying configured credentials to outgoing requests.

use bulwark_core::AuthConfig;
use bulwark_error::ClientErrorKind;
use bulwark_oauth::TokenManager;
use reqwest::RequestBuilder;
use reqwest::header::AUTHORIZATION;

/// Attach credentials for `auth` to `builder`.
pub(crate) async fn apply_auth(
    builder: RequestBuilder,
    auth: &AuthConfig,
    tokens: Option<&TokenManager>,
) -> Result<RequestBuilder, ClientErrorKind> {
    match auth {
        AuthConfig::None => Ok(builder),
        AuthConfig::ApiKeyHeader { header, key } => {
            if key.is_empty() {
                return Err(ClientErrorKind::Authentication("api key is empty".to_string()));
            }
            Ok(builder.header(header.as_str(), key.as_str()))
        }
        AuthConfig::ApiKeyParam { param, key } => {
            if key.is_empty() {
                return Err(ClientErrorKind::Authentication("api key is empty".to_string()));
            }
            Ok(builder.query(&[(param.as_str(), key.as_str())]))
        }
        AuthConfig::Basic { username, password } => {
            Ok(builder.basic_auth(username, Some(password)))
        }
        AuthConfig::OAuth(_) => {
            let tokens = tokens.ok_or_else(|| {
                ClientErrorKind::Authentication("no token manager configured".to_string())
            })?;
            let token = tokens
                .get_valid_token()
                .await
                .map_err(|e| ClientErrorKind::Authentication(e.to_string()))?;
            Ok(builder.header(AUTHORIZATION, token.authorization_value()))
        }
    }
}
