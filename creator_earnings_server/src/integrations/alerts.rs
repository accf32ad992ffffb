//! Operator alerts. Fraud flags are POSTed as JSON to a configured webhook (Slack, PagerDuty, a mail relay...).
//! Delivery is fire-and-forget: failures are logged and never retried.
use std::time::Duration;

use creator_earnings_engine::{db_types::FraudFlag, events::EventHooks};
use log::*;
use reqwest::Client;
use serde_json::{json, Value};

const ALERT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AlertNotifier {
    url: String,
    client: Client,
}

impl AlertNotifier {
    pub fn new(url: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(ALERT_TIMEOUT).build()?;
        Ok(Self { url: url.to_string(), client })
    }

    pub async fn notify(&self, flag: &FraudFlag) {
        let body = alert_body(flag);
        match self.client.post(&self.url).json(&body).send().await {
            Ok(res) if res.status().is_success() => debug!("🚩️ Alert for flag #{} delivered", flag.id),
            Ok(res) => warn!("🚩️ Alert webhook rejected flag #{}. Status {}", flag.id, res.status()),
            Err(e) => warn!("🚩️ Could not deliver alert for flag #{}. {e}", flag.id),
        }
    }
}

pub fn alert_body(flag: &FraudFlag) -> Value {
    json!({
        "text": format!(
            "🚩 {} fraud flag #{} ({}) raised for creator {} with score {}",
            flag.severity, flag.id, flag.flag_type, flag.creator_id, flag.score
        ),
        "flag": flag,
    })
}

/// Hooks that forward every raised flag to the alert webhook. Without a webhook, flags are only logged.
pub fn alert_hooks(notifier: Option<AlertNotifier>) -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_flag_raised(move |ev| {
        let notifier = notifier.clone();
        Box::pin(async move {
            let flag = ev.flag;
            warn!(
                "🚩️ {} flag #{} ({}) raised for {}. Score {}",
                flag.severity, flag.id, flag.flag_type, flag.creator_id, flag.score
            );
            if let Some(notifier) = notifier {
                notifier.notify(&flag).await;
            }
        })
    });
    hooks
}
