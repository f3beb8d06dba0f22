use crate::config::AccountingConfig;
use crate::domain::ports::{AccountingApi, Endpoint, SubmissionResponse};
use crate::domain::transaction::SubmissionRequest;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Tokens are refreshed this long before the issuer says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Posts orders to the Business Central custom endpoints.
///
/// Authenticates with the OAuth2 client-credentials grant and reuses the token
/// until shortly before it expires.
pub struct BusinessCentralClient {
    http: reqwest::Client,
    config: AccountingConfig,
    token: Mutex<Option<CachedToken>>,
}

impl BusinessCentralClient {
    pub fn new(config: AccountingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RelayError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    fn token_url(&self) -> String {
        format!(
            "{}/oauth2/v2.0/token",
            self.config.authority.trim_end_matches('/')
        )
    }

    fn scope(&self) -> String {
        format!("{}/.default", self.config.resource.trim_end_matches('/'))
    }

    fn endpoint_url(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::SalesInvoice => &self.config.sales_invoice_endpoint,
            Endpoint::CreditMemo => &self.config.credit_memo_endpoint,
        }
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let scope = self.scope();
        let response = self
            .http
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RelayError::Connectivity(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Auth(format!(
                "token request rejected with {status}: {body}"
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Auth(format!("malformed token response: {e}")))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        info!(expires_in = token.expires_in, "acquired accounting API token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }
}

#[async_trait]
impl AccountingApi for BusinessCentralClient {
    async fn submit(
        &self,
        endpoint: Endpoint,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResponse> {
        let token = self.access_token().await?;
        let url = self.endpoint_url(endpoint);
        debug!(?endpoint, url, "submitting order");

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| RelayError::Connectivity(format!("accounting API unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Connectivity(format!("response body lost: {e}")))?;

        if status == StatusCode::UNAUTHORIZED {
            self.forget_token().await;
            return Err(RelayError::Auth(format!(
                "accounting API refused the token: {body}"
            )));
        }

        Ok(SubmissionResponse {
            status: status.as_u16(),
            body,
        })
    }
}
