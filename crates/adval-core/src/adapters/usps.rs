//! USPS Addresses API adapter.
//!
//! OAuth-style provider: a token-issuing endpoint plus an address-lookup
//! endpoint that requires a bearer token. The token is cached inside the
//! adapter and proactively refreshed a margin before its stated expiry;
//! this is a small valid/expired state machine independent of the circuit
//! breaker and deliberately not shared with the other adapters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::validator::{AddressValidator, ValidateFuture};
use crate::{NormalizedResult, ProviderId, StandardizedAddress, ValidationInput};

use super::{confidence_score, elapsed_ms};

const TOKEN_URL: &str = "https://apis.usps.com/oauth2/v3/token";
const ADDRESS_URL: &str = "https://apis.usps.com/addresses/v3/address";

/// OAuth client credentials for the USPS APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UspsCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Caches the bearer token and refreshes it before expiry.
struct TokenManager {
    token: Mutex<Option<CachedToken>>,
    refreshing: AtomicBool,
    /// Tokens are treated as expired this long before their stated expiry.
    refresh_margin: Duration,
}

impl Default for TokenManager {
    fn default() -> Self {
        Self {
            token: Mutex::new(None),
            refreshing: AtomicBool::new(false),
            refresh_margin: Duration::from_secs(60),
        }
    }
}

impl TokenManager {
    fn cached_bearer(&self) -> Option<String> {
        let token = self
            .token
            .lock()
            .expect("token cache lock is not poisoned");
        token.as_ref().and_then(|cached| {
            if Instant::now() + self.refresh_margin < cached.expires_at {
                Some(cached.access_token.clone())
            } else {
                None
            }
        })
    }

    async fn bearer(
        &self,
        http_client: &Arc<dyn HttpClient>,
        credentials: &UspsCredentials,
    ) -> Result<String, String> {
        loop {
            if let Some(token) = self.cached_bearer() {
                return Ok(token);
            }

            // Single-flight the refresh: only the caller that takes the
            // flag refreshes, and only that caller clears it. Everyone
            // else waits for the winner's token to land and rechecks.
            if self
                .refreshing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                let outcome = self.refresh(http_client, credentials).await;
                self.refreshing.store(false, Ordering::SeqCst);
                return outcome;
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn refresh(
        &self,
        http_client: &Arc<dyn HttpClient>,
        credentials: &UspsCredentials,
    ) -> Result<String, String> {
        let body = json!({
            "client_id": credentials.client_id,
            "client_secret": credentials.client_secret,
            "grant_type": "client_credentials",
        })
        .to_string();
        let request = HttpRequest::post(TOKEN_URL).with_json_body(body);

        let response = http_client
            .execute(request)
            .await
            .map_err(|error| format!("token request failed: {}", error.message()))?;
        if !response.is_success() {
            return Err(format!(
                "token endpoint returned status {}",
                response.status
            ));
        }

        let grant: TokenGrant = serde_json::from_str(&response.body)
            .map_err(|error| format!("token response was malformed: {error}"))?;

        let access_token = grant.access_token;
        let expires_at = Instant::now() + Duration::from_secs(grant.expires_in);
        *self
            .token
            .lock()
            .expect("token cache lock is not poisoned") = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at,
        });
        debug!(expires_in = grant.expires_in, "refreshed usps bearer token");

        Ok(access_token)
    }

    fn invalidate(&self) {
        *self
            .token
            .lock()
            .expect("token cache lock is not poisoned") = None;
    }
}

pub struct UspsAdapter {
    http_client: Arc<dyn HttpClient>,
    credentials: Option<UspsCredentials>,
    token_manager: TokenManager,
}

impl UspsAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, credentials: Option<UspsCredentials>) -> Self {
        Self {
            http_client,
            credentials,
            token_manager: TokenManager::default(),
        }
    }

    fn lookup_url(input: &ValidationInput) -> String {
        let mut url = format!(
            "{ADDRESS_URL}?streetAddress={}&state={}",
            urlencoding::encode(&input.street),
            urlencoding::encode(&input.state),
        );
        if let Some(secondary) = input.secondary.as_deref() {
            url.push_str(&format!(
                "&secondaryAddress={}",
                urlencoding::encode(secondary)
            ));
        }
        if let Some(city) = input.city.as_deref() {
            url.push_str(&format!("&city={}", urlencoding::encode(city)));
        }
        if let Some(zip) = input.postal_code.as_deref() {
            url.push_str(&format!("&ZIPCode={}", urlencoding::encode(zip)));
        }
        url
    }

    async fn lookup(&self, input: &ValidationInput) -> NormalizedResult {
        let started = Instant::now();
        let Some(credentials) = &self.credentials else {
            return NormalizedResult::unavailable(
                ProviderId::Usps,
                "usps credentials are not configured",
            );
        };

        let token = match self
            .token_manager
            .bearer(&self.http_client, credentials)
            .await
        {
            Ok(token) => token,
            Err(message) => {
                warn!(message = %message, "usps token acquisition failed");
                return NormalizedResult::unavailable(
                    ProviderId::Usps,
                    format!("usps authentication failed: {message}"),
                )
                .with_latency(elapsed_ms(started));
            }
        };

        let request =
            HttpRequest::get(Self::lookup_url(input)).with_auth(&HttpAuth::BearerToken(token));
        let response = match self.http_client.execute(request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "usps transport failure");
                return NormalizedResult::unavailable(
                    ProviderId::Usps,
                    format!("usps transport failure: {}", error.message()),
                )
                .with_latency(elapsed_ms(started));
            }
        };

        if response.is_auth_failure() {
            // The cached token may have been revoked early; drop it so the
            // next call re-authenticates.
            self.token_manager.invalidate();
            return NormalizedResult::unavailable(
                ProviderId::Usps,
                format!("usps authentication failed (status {})", response.status),
            )
            .with_latency(elapsed_ms(started));
        }
        if response.is_rate_limited() {
            return NormalizedResult::unavailable(
                ProviderId::Usps,
                "usps rate limit or quota exceeded",
            )
            .with_latency(elapsed_ms(started));
        }
        if response.status == 400 || response.status == 404 {
            return NormalizedResult::rejected(
                ProviderId::Usps,
                vec![String::from("address was not found or is malformed")],
            )
            .with_latency(elapsed_ms(started));
        }
        if !response.is_success() {
            return NormalizedResult::unavailable(
                ProviderId::Usps,
                format!("usps upstream returned status {}", response.status),
            )
            .with_latency(elapsed_ms(started));
        }

        let envelope: UspsResponse = match serde_json::from_str(&response.body) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(error = %error, "usps response shape was unexpected");
                return NormalizedResult::unavailable(
                    ProviderId::Usps,
                    format!("usps returned an unexpected response shape: {error}"),
                )
                .with_latency(elapsed_ms(started));
            }
        };

        Self::map_response(input, envelope).with_latency(elapsed_ms(started))
    }

    fn map_response(input: &ValidationInput, envelope: UspsResponse) -> NormalizedResult {
        let Some(address) = envelope.address else {
            return NormalizedResult::rejected(
                ProviderId::Usps,
                vec![String::from("no matching address was found")],
            );
        };

        let info = envelope.additional_info.unwrap_or_default();
        let dpv = info.dpv_confirmation.as_deref().unwrap_or("");
        let delivery_confirmed = matches!(dpv, "Y" | "S" | "D");
        let vacant = info.vacant.as_deref() == Some("Y");

        let mut suggestions: Vec<String> = envelope
            .corrections
            .iter()
            .filter_map(|correction| correction.text.clone())
            .filter(|text| !text.is_empty())
            .collect();
        if dpv == "D" {
            suggestions.push(String::from(
                "address is a multi-unit building; a secondary unit number is required",
            ));
        }

        let mut errors = Vec::new();
        if vacant {
            errors.push(String::from("address is flagged vacant"));
        }
        if !delivery_confirmed {
            errors.push(String::from("delivery point could not be confirmed"));
        }

        let is_valid = delivery_confirmed && !vacant;
        let standardized = if is_valid {
            Some(StandardizedAddress {
                street: address
                    .street_address
                    .clone()
                    .unwrap_or_else(|| input.street.clone()),
                secondary: address.secondary_address.clone(),
                city: address
                    .city
                    .clone()
                    .unwrap_or_else(|| input.city.clone().unwrap_or_default()),
                state: address.state.clone().unwrap_or_else(|| input.state.clone()),
                zip5: address.zip_code.clone().unwrap_or_default(),
                zip4: address.zip_plus4.clone().filter(|zip4| !zip4.is_empty()),
            })
        } else {
            None
        };

        let confidence = confidence_score(
            delivery_confirmed,
            standardized
                .as_ref()
                .map(|standardized| standardized.zip4.is_some())
                .unwrap_or(false),
            dpv == "Y",
            envelope.corrections.is_empty(),
        );

        NormalizedResult {
            is_valid,
            standardized,
            suggestions,
            errors,
            service_unavailable: false,
            provider: Some(ProviderId::Usps),
            latency_ms: 0,
            did_fallback: false,
            confidence: Some(confidence),
        }
    }
}

impl AddressValidator for UspsAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Usps
    }

    fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    fn validate<'a>(&'a self, input: &'a ValidationInput) -> ValidateFuture<'a> {
        Box::pin(self.lookup(input))
    }
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct UspsResponse {
    #[serde(default)]
    address: Option<UspsAddress>,
    #[serde(default, rename = "additionalInfo")]
    additional_info: Option<UspsAdditionalInfo>,
    #[serde(default)]
    corrections: Vec<UspsCorrection>,
}

#[derive(Debug, Deserialize)]
struct UspsAddress {
    #[serde(default, rename = "streetAddress")]
    street_address: Option<String>,
    #[serde(default, rename = "secondaryAddress")]
    secondary_address: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default, rename = "ZIPCode")]
    zip_code: Option<String>,
    #[serde(default, rename = "ZIPPlus4")]
    zip_plus4: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UspsAdditionalInfo {
    #[serde(default, rename = "DPVConfirmation")]
    dpv_confirmation: Option<String>,
    #[serde(default)]
    vacant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UspsCorrection {
    #[serde(default)]
    text: Option<String>,
}
