//! Frappe RPC client.
//!
//! Implements [`Backend`] against a Frappe/ERPNext site running the POS app.
//!
//! ### Protocol
//!
//! - **Endpoint**: `POST {base_url}/api/method/<dotted.method.path>`
//! - **Authentication**: `Authorization: token <api_key>:<api_secret>`
//! - **Body**: JSON object of keyword arguments
//! - **Response**: `{"message": ...}`, or an exception envelope on failure

pub mod error;
pub mod request;
mod response;

pub use error::ClientError;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use posa_offline_core::{AppConfig, Backend, InvoiceEntry, StockQuantity};
use reqwest::{Url, header};
use serde_json::Value;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "posa-offline/0.1";

/// Frappe client configuration.
#[derive(Debug, Clone)]
pub struct FrappeConfig {
    /// Site URL, e.g. `https://erp.example.com`.
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Request timeout (default: 20s).
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FrappeConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FrappeConfig {
    /// Build from the backend section of [`AppConfig`].
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ClientError> {
        let backend = config.require_backend()?;
        Ok(Self {
            base_url: backend.url.to_string(),
            api_key: backend.api_key.to_string(),
            api_secret: backend.api_secret.to_string(),
            timeout: config.timeout(),
            ..Default::default()
        })
    }
}

/// HTTP client for the POS app's whitelisted methods.
#[derive(Debug, Clone)]
pub struct FrappeClient {
    http: reqwest::Client,
    base_url: Url,
    auth: String,
}

impl FrappeClient {
    pub fn new(config: FrappeConfig) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;

        Ok(Self { http, base_url, auth: format!("token {}:{}", config.api_key, config.api_secret) })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, ClientError> {
        Self::new(FrappeConfig::from_app_config(config)?)
    }

    /// URL of a whitelisted method.
    pub fn method_url(&self, method: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(&format!("api/method/{method}"))
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    /// Call `method` with keyword arguments `args` and return its `message`.
    pub async fn call(&self, method: &str, args: &Value) -> Result<Value, ClientError> {
        let url = self.method_url(method)?;
        let start = Instant::now();
        tracing::debug!(method, "calling backend method");

        let http_response = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, &self.auth)
            .header(header::ACCEPT, "application/json")
            .json(args)
            .send()
            .await?;

        let status = http_response.status().as_u16();
        let body = http_response.bytes().await?;
        let result = response::parse_envelope(status, &body);

        match &result {
            Ok(_) => {
                tracing::debug!(method, status, elapsed_ms = start.elapsed().as_millis() as u64, "backend call completed")
            }
            Err(e) => tracing::warn!(method, status, error = %e, "backend call failed"),
        }
        result
    }
}

#[async_trait]
impl Backend for FrappeClient {
    async fn submit_invoice(&self, entry: &InvoiceEntry) -> Result<Value, posa_offline_core::Error> {
        Ok(self.call(request::SUBMIT_INVOICE, &request::submit_invoice(entry)).await?)
    }

    async fn save_draft_invoice(&self, invoice: &Value) -> Result<Value, posa_offline_core::Error> {
        Ok(self.call(request::UPDATE_INVOICE, &request::update_invoice(invoice)).await?)
    }

    async fn create_customer(&self, customer: &Value) -> Result<Value, posa_offline_core::Error> {
        Ok(self.call(request::CREATE_CUSTOMER, &request::create_customer(customer)).await?)
    }

    async fn submit_payment(&self, payment: &Value) -> Result<Value, posa_offline_core::Error> {
        Ok(self.call(request::PROCESS_PAYMENT, &request::process_payment(payment)).await?)
    }

    async fn fetch_stock_quantities(
        &self, item_codes: &[String], pos_profile: &str,
    ) -> Result<Vec<StockQuantity>, posa_offline_core::Error> {
        let message = self
            .call(request::GET_ITEMS_DETAILS, &request::get_items_details(item_codes, pos_profile))
            .await?;
        if message.is_null() {
            return Err(ClientError::Parse("no response from server".into()).into());
        }
        serde_json::from_value(message).map_err(|e| ClientError::Parse(e.to_string()).into())
    }
}
