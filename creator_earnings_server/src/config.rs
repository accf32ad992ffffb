use std::{env, net::IpAddr, time::Duration as StdDuration};

use ceg_common::{helpers::parse_boolean_flag, MinorUnits, Secret};
use chrono::Duration;
use creator_earnings_engine::{
    db_url,
    traits::{DEFAULT_CLEARING_DELAY_DAYS, DEFAULT_PLATFORM_FEE_BPS},
    LedgerPolicy,
    RiskPolicy,
};
use log::*;
use provider_tools::{MpesaConfig, PaystackConfig};
use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::errors::ServerError;

const DEFAULT_CEG_HOST: &str = "127.0.0.1";
const DEFAULT_CEG_PORT: u16 = 8370;
const DEFAULT_CLEARING_INTERVAL: StdDuration = StdDuration::from_secs(60);
const DEFAULT_RECONCILIATION_INTERVAL: StdDuration = StdDuration::from_secs(300);
/// Pending payments older than this are checked with the provider by the reconciliation worker.
const DEFAULT_STALE_PAYMENT_AGE: Duration = Duration::minutes(10);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    pub paystack: PaystackConfig,
    /// Verify `x-paystack-signature` on webhook calls. Only switch this off against the sandbox.
    pub paystack_signature_checks: bool,
    pub mpesa: MpesaConfig,
    /// If supplied, M-Pesa callbacks are only accepted from these addresses.
    pub mpesa_whitelist: Option<Vec<IpAddr>>,
    pub ledger_policy: LedgerPolicy,
    pub risk_policy: RiskPolicy,
    pub payout_fee: MinorUnits,
    /// Fraud flags are POSTed here as JSON when set.
    pub alert_webhook_url: Option<String>,
    pub clearing_interval: StdDuration,
    pub reconciliation_interval: StdDuration,
    pub stale_payment_age: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CEG_HOST.to_string(),
            port: DEFAULT_CEG_PORT,
            database_url: db_url(),
            auth: AuthConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            paystack: PaystackConfig::default(),
            paystack_signature_checks: true,
            mpesa: MpesaConfig::default(),
            mpesa_whitelist: None,
            ledger_policy: LedgerPolicy::default(),
            risk_policy: RiskPolicy::default(),
            payout_fee: MinorUnits::zero(),
            alert_webhook_url: None,
            clearing_interval: DEFAULT_CLEARING_INTERVAL,
            reconciliation_interval: DEFAULT_RECONCILIATION_INTERVAL,
            stale_payment_age: DEFAULT_STALE_PAYMENT_AGE,
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T>
where T::Err: std::fmt::Display {
    env::var(name)
        .ok()
        .and_then(|s| s.parse::<T>().map_err(|e| warn!("🪛️ Invalid configuration value for {name} ({s}). {e}")).ok())
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("CEG_HOST").ok().unwrap_or_else(|| DEFAULT_CEG_HOST.into());
        let port = env_number::<u16>("CEG_PORT").unwrap_or(DEFAULT_CEG_PORT);
        let database_url = db_url();
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration."
            );
            AuthConfig::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("CEG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("CEG_USE_FORWARDED").ok(), false);
        let paystack = PaystackConfig::new_from_env_or_default();
        let paystack_signature_checks = parse_boolean_flag(env::var("CEG_PAYSTACK_SIGNATURE_CHECKS").ok(), true);
        if !paystack_signature_checks {
            warn!("🚨️ Paystack webhook signature checks are DISABLED. Never run production like this.");
        }
        let mpesa = MpesaConfig::new_from_env_or_default();
        let mpesa_whitelist = configure_mpesa_whitelist();
        let ledger_policy = configure_ledger_policy();
        let risk_policy = configure_risk_policy();
        let payout_fee = env_number::<i64>("CEG_PAYOUT_FEE").map(MinorUnits::from).unwrap_or_default();
        if payout_fee.is_negative() {
            warn!("🪛️ CEG_PAYOUT_FEE cannot be negative. Payouts will be free.");
        }
        let alert_webhook_url = env::var("CEG_ALERT_WEBHOOK_URL").ok().filter(|s| !s.is_empty());
        if alert_webhook_url.is_none() {
            info!("🪛️ CEG_ALERT_WEBHOOK_URL is not set. Fraud flags will only be logged.");
        }
        let clearing_interval = env_number::<u64>("CEG_CLEARING_INTERVAL_SECS")
            .map(StdDuration::from_secs)
            .unwrap_or(DEFAULT_CLEARING_INTERVAL);
        let reconciliation_interval = env_number::<u64>("CEG_RECONCILIATION_INTERVAL_SECS")
            .map(StdDuration::from_secs)
            .unwrap_or(DEFAULT_RECONCILIATION_INTERVAL);
        let stale_payment_age =
            env_number::<i64>("CEG_STALE_PAYMENT_MINUTES").map(Duration::minutes).unwrap_or(DEFAULT_STALE_PAYMENT_AGE);
        Self {
            host,
            port,
            database_url,
            auth,
            use_x_forwarded_for,
            use_forwarded,
            paystack,
            paystack_signature_checks,
            mpesa,
            mpesa_whitelist,
            ledger_policy,
            risk_policy,
            payout_fee: if payout_fee.is_negative() { MinorUnits::zero() } else { payout_fee },
            alert_webhook_url,
            clearing_interval,
            reconciliation_interval,
            stale_payment_age,
        }
    }
}

fn configure_ledger_policy() -> LedgerPolicy {
    let default_fee_bps = match env_number::<u32>("CEG_PLATFORM_FEE_BPS") {
        Some(bps) if bps <= 10_000 => bps,
        Some(bps) => {
            warn!("🪛️ CEG_PLATFORM_FEE_BPS must be between 0 and 10000, not {bps}. Using {DEFAULT_PLATFORM_FEE_BPS}.");
            DEFAULT_PLATFORM_FEE_BPS
        },
        None => DEFAULT_PLATFORM_FEE_BPS,
    };
    let clearing_delay = env_number::<i64>("CEG_CLEARING_DELAY_DAYS")
        .filter(|d| *d >= 0)
        .map(Duration::days)
        .unwrap_or_else(|| Duration::days(DEFAULT_CLEARING_DELAY_DAYS));
    info!(
        "🪛️ Platform fee is {} bps. Earnings clear after {} days.",
        default_fee_bps,
        clearing_delay.num_days()
    );
    LedgerPolicy { default_fee_bps, clearing_delay }
}

fn configure_risk_policy() -> RiskPolicy {
    let mut policy = match env_number::<i64>("CEG_LOW_PAYOUT_CAP") {
        Some(cap) if cap > 0 => RiskPolicy::with_low_cap(MinorUnits::from(cap)),
        Some(cap) => {
            warn!("🪛️ CEG_LOW_PAYOUT_CAP must be positive, not {cap}. Using the default caps.");
            RiskPolicy::default()
        },
        None => RiskPolicy::default(),
    };
    if let Some(days) = env_number::<i64>("CEG_FIRST_PAYOUT_DELAY_DAYS").filter(|d| *d >= 0) {
        policy.first_payout_delay = Duration::days(days);
    }
    info!(
        "🪛️ Weekly payout caps: {} / {} / {}. First payout after {} days.",
        policy.low_cap,
        policy.mid_cap,
        policy.high_cap,
        policy.first_payout_delay.num_days()
    );
    policy
}

fn configure_mpesa_whitelist() -> Option<Vec<IpAddr>> {
    let whitelist = env::var("CEG_MPESA_IP_WHITELIST").ok().and_then(|s| {
        if ["none", "false", "0", ""].contains(&s.to_lowercase().as_str()) {
            return None;
        }
        let ip_addrs = s
            .split(',')
            .filter_map(|s| {
                s.trim()
                    .parse()
                    .map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in CEG_MPESA_IP_WHITELIST: {e}"))
                    .ok()
            })
            .collect::<Vec<IpAddr>>();
        Some(ip_addrs)
    });
    match &whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The M-Pesa IP whitelist was configured, but is empty. The server will run, but won't accept any \
                 M-Pesa callbacks."
            );
        },
        None => info!("🪛️ No M-Pesa IP whitelist is set. Callbacks are accepted from any address."),
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ M-Pesa IP whitelist: {addrs}");
        },
    }
    whitelist
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Shared HS256 secret with the session service that issues access tokens.
    pub jwt_secret: Secret<String>,
    /// Clock skew allowed when checking `exp`, in seconds.
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT secret has not been set. I'm using a random value for this session. No externally issued \
             token will be accepted. 🚨️🚨️🚨️"
        );
        let secret = thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect::<String>();
        Self { jwt_secret: Secret::new(secret), leeway_secs: 30 }
    }
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret = env::var("CEG_JWT_SECRET")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [CEG_JWT_SECRET]")))?;
        if secret.len() < 32 {
            return Err(ServerError::ConfigurationError("CEG_JWT_SECRET must be at least 32 characters".into()));
        }
        let leeway_secs = env_number::<u64>("CEG_JWT_LEEWAY_SECS").unwrap_or(30);
        Ok(Self { jwt_secret: Secret::new(secret), leeway_secs })
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that handlers need. Secrets are deliberately left out.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
    pub mpesa_whitelist: Option<Vec<IpAddr>>,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
            mpesa_whitelist: config.mpesa_whitelist.clone(),
        }
    }
}
