use std::sync::Arc;

use ceg_common::MinorUnits;
use chrono::{DateTime, Duration, Utc};
use log::*;
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use crate::{
    config::MpesaConfig,
    data_objects::{MpesaAuthResponse, StkPushRequest, StkPushResponse, StkQueryRequest, StkQueryResponse},
    helpers::{mpesa_password, mpesa_timestamp, new_mpesa_account_reference},
    retry::with_retry,
    ProviderApiError,
};

const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
/// Tokens are refreshed this long before Daraja says they expire.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MpesaApi {
    config: MpesaConfig,
    client: Arc<Client>,
    token: Arc<Mutex<Option<AccessToken>>>,
}

impl MpesaApi {
    pub fn new(config: MpesaConfig) -> Result<Self, ProviderApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client), token: Arc::new(Mutex::new(None)) })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url().trim_end_matches('/'))
    }

    pub fn password(&self, timestamp: &str) -> String {
        mpesa_password(&self.config.shortcode, self.config.passkey.reveal(), timestamp)
    }

    async fn access_token(&self) -> Result<String, ProviderApiError> {
        if !self.is_configured() {
            return Err(ProviderApiError::NotConfigured("M-Pesa credentials are not set".into()));
        }
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref() {
            if t.expires_at > Utc::now() {
                return Ok(t.token.clone());
            }
        }
        trace!("📞️ Requesting a new M-Pesa access token");
        let response = self
            .client
            .get(self.url("/oauth/v1/generate"))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(self.config.consumer_key.reveal(), Some(self.config.consumer_secret.reveal()))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await?;
            return Err(ProviderApiError::QueryError { status, message });
        }
        let auth = response.json::<MpesaAuthResponse>().await?;
        let lifetime = auth.expires_in.trim().parse::<i64>().unwrap_or(3599);
        let expires_at = Utc::now() + Duration::seconds((lifetime - TOKEN_EXPIRY_MARGIN_SECS).max(0));
        debug!("📞️ M-Pesa access token refreshed. Valid until {expires_at}");
        *cached = Some(AccessToken { token: auth.access_token.clone(), expires_at });
        Ok(auth.access_token)
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderApiError> {
        let token = self.access_token().await?;
        let url = self.url(path);
        trace!("📞️ Sending M-Pesa query: {url}");
        let response = self.client.request(method, url).bearer_auth(token).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            trace!("📞️ M-Pesa query successful. {status}");
            Ok(response.json::<T>().await?)
        } else {
            let message = response.text().await?;
            Err(ProviderApiError::QueryError { status: status.as_u16(), message })
        }
    }

    /// Sends an STK push prompt to the customer's phone. Daraja only accepts whole shillings.
    pub async fn stk_push(
        &self,
        phone_number: &str,
        amount: MinorUnits,
        description: &str,
    ) -> Result<StkPushResponse, ProviderApiError> {
        if !amount.is_positive() {
            return Err(ProviderApiError::InvalidAmount(format!("{amount} is not a valid charge")));
        }
        let amount = amount.to_major().map_err(|e| ProviderApiError::InvalidAmount(e.to_string()))?;
        let timestamp = mpesa_timestamp(Utc::now());
        let request = StkPushRequest {
            business_short_code: self.config.shortcode.clone(),
            password: self.password(&timestamp),
            timestamp,
            transaction_type: TRANSACTION_TYPE.to_string(),
            amount,
            party_a: phone_number.to_string(),
            party_b: self.config.shortcode.clone(),
            phone_number: phone_number.to_string(),
            call_back_url: self.config.callback_url.clone(),
            account_reference: new_mpesa_account_reference(),
            transaction_desc: description.to_string(),
        };
        debug!("📞️ Sending STK push of KES {amount} to {phone_number}");
        let response =
            self.rest_query::<StkPushResponse, _>(Method::POST, "/mpesa/stkpush/v1/processrequest", &request).await?;
        if !response.accepted() {
            warn!("📞️ STK push rejected. {} {}", response.response_code, response.response_description);
            return Err(ProviderApiError::Rejected(response.response_description));
        }
        info!("📞️ STK push accepted. Checkout request {}", response.checkout_request_id);
        Ok(response)
    }

    pub async fn query_stk_status(&self, checkout_request_id: &str) -> Result<StkQueryResponse, ProviderApiError> {
        let label = format!("M-Pesa STK query {checkout_request_id}");
        with_retry(&self.config.retry, &label, || async move {
            let timestamp = mpesa_timestamp(Utc::now());
            let request = StkQueryRequest {
                business_short_code: self.config.shortcode.clone(),
                password: self.password(&timestamp),
                timestamp,
                checkout_request_id: checkout_request_id.to_string(),
            };
            self.rest_query::<StkQueryResponse, _>(Method::POST, "/mpesa/stkpushquery/v1/query", &request).await
        })
        .await
    }
}
