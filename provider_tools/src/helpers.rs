use chrono::{DateTime, FixedOffset, Utc};
use hmac::{Hmac, Mac};
use log::error;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Daraja timestamps are local Nairobi time (UTC+3).
const EAT_OFFSET_SECS: i32 = 3 * 3600;

fn random_tag(len: usize) -> String {
    thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

/// A fresh Paystack transaction reference, e.g. `PAY_x8Kp2Lq0_1718000000`.
pub fn new_paystack_reference() -> String {
    format!("PAY_{}_{}", random_tag(8), Utc::now().timestamp())
}

/// The `AccountReference` shown to the payer on their phone.
pub fn new_mpesa_account_reference() -> String {
    format!("Newsletter_{}", random_tag(8))
}

/// `YYYYMMDDHHMMSS` in East Africa Time.
pub fn mpesa_timestamp(now: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(EAT_OFFSET_SECS) {
        Some(eat) => now.with_timezone(&eat).format("%Y%m%d%H%M%S").to_string(),
        None => now.format("%Y%m%d%H%M%S").to_string(),
    }
}

/// `base64(shortcode + passkey + timestamp)`
pub fn mpesa_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    base64::encode(format!("{shortcode}{passkey}{timestamp}"))
}

/// Lower-case hex HMAC-SHA512 of `body`, as sent by Paystack in `x-paystack-signature`.
pub fn paystack_signature(secret: &str, body: &[u8]) -> String {
    match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        },
        Err(e) => {
            error!("🔐️ Could not initialise HMAC. {e}");
            String::default()
        },
    }
}

/// Constant-time comparison of the Paystack signature header against the body.
pub fn verify_paystack_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
