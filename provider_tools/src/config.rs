use std::{env, time::Duration};

use ceg_common::Secret;
use log::*;

use crate::RetryPolicy;

pub const PAYSTACK_BASE_URL: &str = "https://api.paystack.co";
pub const MPESA_SANDBOX_URL: &str = "https://sandbox.safaricom.co.ke";
pub const MPESA_PRODUCTION_URL: &str = "https://api.safaricom.co.ke";
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

fn provider_timeout() -> Duration {
    env::var("CEG_PROVIDER_TIMEOUT_SECS")
        .ok()
        .and_then(|s| {
            s.parse::<u64>().map_err(|e| warn!("🪛️ Invalid value for CEG_PROVIDER_TIMEOUT_SECS ({s}). {e}")).ok()
        })
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_PROVIDER_TIMEOUT)
}

fn retry_policy() -> RetryPolicy {
    let mut policy = RetryPolicy::default();
    if let Some(attempts) = env::var("CEG_PROVIDER_MAX_ATTEMPTS").ok().and_then(|s| s.parse::<u32>().ok()) {
        policy.max_attempts = attempts.max(1);
    }
    policy
}

//-------------------------------------------------  Paystack  ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: Secret<String>,
    pub base_url: String,
    /// Where Paystack sends the customer after checkout. Optional; Paystack falls back to the dashboard setting.
    pub callback_url: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            secret_key: Secret::default(),
            base_url: PAYSTACK_BASE_URL.to_string(),
            callback_url: None,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl PaystackConfig {
    pub fn new_from_env_or_default() -> Self {
        let secret_key = Secret::new(env::var("CEG_PAYSTACK_SECRET_KEY").unwrap_or_else(|_| {
            warn!("🪛️ CEG_PAYSTACK_SECRET_KEY not set. Paystack payments are disabled.");
            String::default()
        }));
        let base_url = env::var("CEG_PAYSTACK_BASE_URL").unwrap_or_else(|_| PAYSTACK_BASE_URL.to_string());
        let callback_url = env::var("CEG_PAYSTACK_CALLBACK_URL").ok().filter(|s| !s.is_empty());
        Self { secret_key, base_url, callback_url, timeout: provider_timeout(), retry: retry_policy() }
    }

    pub fn is_configured(&self) -> bool {
        !self.secret_key.is_empty()
    }
}

//-------------------------------------------------   M-Pesa   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MpesaEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => MPESA_SANDBOX_URL,
            Self::Production => MPESA_PRODUCTION_URL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: Secret<String>,
    pub consumer_secret: Secret<String>,
    /// The paybill / till number that receives the money.
    pub shortcode: String,
    pub passkey: Secret<String>,
    /// Publicly reachable URL of the server's M-Pesa callback route.
    pub callback_url: String,
    pub environment: MpesaEnvironment,
    /// Overrides the environment's base url. Used against local stubs.
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for MpesaConfig {
    fn default() -> Self {
        Self {
            consumer_key: Secret::default(),
            consumer_secret: Secret::default(),
            shortcode: String::default(),
            passkey: Secret::default(),
            callback_url: String::default(),
            environment: MpesaEnvironment::default(),
            base_url: None,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl MpesaConfig {
    pub fn new_from_env_or_default() -> Self {
        let secret = |name: &str| {
            Secret::new(env::var(name).unwrap_or_else(|_| {
                warn!("🪛️ {name} not set. M-Pesa payments are disabled.");
                String::default()
            }))
        };
        let consumer_key = secret("CEG_MPESA_CONSUMER_KEY");
        let consumer_secret = secret("CEG_MPESA_CONSUMER_SECRET");
        let passkey = secret("CEG_MPESA_PASSKEY");
        let shortcode = env::var("CEG_MPESA_SHORTCODE").unwrap_or_default();
        let callback_url = env::var("CEG_MPESA_CALLBACK_URL").unwrap_or_else(|_| {
            warn!("🪛️ CEG_MPESA_CALLBACK_URL not set. M-Pesa will not be able to reach the callback route.");
            String::default()
        });
        let environment = match env::var("CEG_MPESA_ENVIRONMENT").map(|s| s.to_lowercase()) {
            Ok(s) if s == "production" => MpesaEnvironment::Production,
            Ok(s) if s == "sandbox" => MpesaEnvironment::Sandbox,
            _ => {
                info!("🪛️ CEG_MPESA_ENVIRONMENT not set. Using the sandbox.");
                MpesaEnvironment::Sandbox
            },
        };
        let base_url = env::var("CEG_MPESA_BASE_URL").ok().filter(|s| !s.is_empty());
        Self {
            consumer_key,
            consumer_secret,
            shortcode,
            passkey,
            callback_url,
            environment,
            base_url,
            timeout: provider_timeout(),
            retry: retry_policy(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.consumer_key.is_empty() && !self.consumer_secret.is_empty() && !self.shortcode.is_empty()
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or_else(|| self.environment.base_url())
    }
}
