use std::sync::Arc;

use ceg_common::MinorUnits;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    config::PaystackConfig,
    data_objects::{InitializeTransaction, InitializedTransaction, PaystackEnvelope, PaystackTransaction},
    helpers::{new_paystack_reference, verify_paystack_signature},
    retry::with_retry,
    ProviderApiError,
};

#[derive(Clone)]
pub struct PaystackApi {
    config: PaystackConfig,
    client: Arc<Client>,
}

impl PaystackApi {
    pub fn new(config: PaystackConfig) -> Result<Self, ProviderApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let val = HeaderValue::from_str(&bearer).map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn config(&self) -> &PaystackConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ProviderApiError> {
        if !self.is_configured() {
            return Err(ProviderApiError::NotConfigured("Paystack secret key is not set".into()));
        }
        let url = self.url(path);
        trace!("📞️ Sending Paystack query: {url}");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            trace!("📞️ Paystack query successful. {status}");
            let envelope = response.json::<PaystackEnvelope<T>>().await?;
            match (envelope.status, envelope.data) {
                (true, Some(data)) => Ok(data),
                (_, _) => Err(ProviderApiError::Rejected(envelope.message)),
            }
        } else {
            let message = response.text().await?;
            // Paystack reports a bad request with a `{"status": false, "message": ...}` body
            let message = serde_json::from_str::<Value>(&message)
                .ok()
                .and_then(|v| v["message"].as_str().map(String::from))
                .unwrap_or(message);
            Err(ProviderApiError::QueryError { status: status.as_u16(), message })
        }
    }

    /// Starts a hosted checkout. A fresh reference is generated when none is given.
    pub async fn initialize_transaction(
        &self,
        email: &str,
        amount: MinorUnits,
        currency: &str,
        reference: Option<String>,
        metadata: Option<Value>,
    ) -> Result<InitializedTransaction, ProviderApiError> {
        if !amount.is_positive() {
            return Err(ProviderApiError::InvalidAmount(format!("{amount} is not a valid charge")));
        }
        let body = InitializeTransaction {
            email: email.to_string(),
            amount: amount.value(),
            currency: currency.to_string(),
            reference: reference.unwrap_or_else(new_paystack_reference),
            callback_url: self.config.callback_url.clone(),
            metadata,
        };
        debug!("📞️ Initializing Paystack transaction {} for {amount} {currency}", body.reference);
        // Initialization is not idempotent on Paystack's side, so it is never retried.
        let result =
            self.rest_query::<InitializedTransaction, _>(Method::POST, "/transaction/initialize", Some(&body)).await?;
        info!("📞️ Paystack transaction {} initialized", result.reference);
        Ok(result)
    }

    pub async fn verify_transaction(&self, reference: &str) -> Result<PaystackTransaction, ProviderApiError> {
        let path = format!("/transaction/verify/{reference}");
        let path = path.as_str();
        let label = format!("Paystack verify {reference}");
        let tx = with_retry(&self.config.retry, &label, || {
            self.rest_query::<PaystackTransaction, ()>(Method::GET, path, None)
        })
        .await?;
        debug!("📞️ Paystack says {reference} is {}", tx.status);
        Ok(tx)
    }

    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        verify_paystack_signature(self.config.secret_key.reveal(), body, signature)
    }
}
