use anyhow::{Context, Result, anyhow};
use code_checker_core::{error::PipelineError, models::AccessToken};
use jsonwebtoken::{Algorithm, Header};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::GitHub;

/// Lifetime of the app assertion. GitHub rejects anything longer than ten minutes.
const ASSERTION_TTL: i64 = 10 * 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl GitHub {
    /// Sign a short-lived RS256 assertion identifying the app itself.
    pub fn app_assertion(&self) -> Result<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims { iat: now, exp: now + ASSERTION_TTL, iss: self.app_id.to_string() };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .context("Failed to sign app assertion")
    }

    /// Exchange the app assertion for an access token scoped to one installation.
    ///
    /// No retry: a failure aborts the run.
    pub async fn mint_installation_token(
        &self,
        installation_id: u64,
    ) -> Result<AccessToken, PipelineError> {
        self.exchange(installation_id).await.map_err(PipelineError::UpstreamAuth)
    }

    async fn exchange(&self, installation_id: u64) -> Result<AccessToken> {
        let assertion = self.app_assertion()?;
        let id = installation_id.to_string();
        let url = self.api(&["app", "installations", &id, "access_tokens"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(assertion)
            .send()
            .await
            .context("Token request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Token endpoint returned {status}: {}", body.trim()));
        }
        let token: AccessToken =
            response.json().await.context("Failed to parse installation token")?;
        tracing::debug!(
            "Minted token for installation {} (expires {:?})",
            installation_id,
            token.expiry
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{DecodingKey, Validation};
    use mockito::Matcher;

    use super::*;
    use crate::test_support::{PUBLIC_KEY, github};

    #[test]
    fn test_assertion_claims() {
        let github = github("https://api.github.com");
        let assertion = github.app_assertion().unwrap();
        let key = DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap();
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&["4242"]);
        let decoded = jsonwebtoken::decode::<Claims>(&assertion, &key, &validation).unwrap();
        assert_eq!(decoded.header.alg, Algorithm::RS256);
        assert_eq!(decoded.claims.exp - decoded.claims.iat, ASSERTION_TTL);
        let now = OffsetDateTime::now_utc().unix_timestamp();
        assert!((decoded.claims.iat - now).abs() < 60);
    }

    #[tokio::test]
    async fn test_mint_installation_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/app/installations/99/access_tokens")
            .match_header("authorization", Matcher::Regex("^Bearer .+\\..+\\..+$".to_string()))
            .match_header("accept", "application/vnd.github.v3+json")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token":"ghs_test","expires_at":"2026-10-17T12:00:00Z"}"#)
            .create_async()
            .await;
        let github = github(&server.url());
        let token = github.mint_installation_token(99).await.unwrap();
        assert_eq!(token.value, "ghs_test");
        assert!(token.expiry.is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_mint_failure_is_upstream_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/app/installations/7/access_tokens")
            .with_status(401)
            .with_body(r#"{"message":"Bad credentials"}"#)
            .expect(1)
            .create_async()
            .await;
        let github = github(&server.url());
        let err = github.mint_installation_token(7).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamAuth(_)));
        assert!(err.to_string().contains("401"), "{err}");
        mock.assert_async().await;
    }
}
