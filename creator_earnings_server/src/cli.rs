use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 25] = [
        "RUST_LOG",
        "CEG_HOST",
        "CEG_PORT",
        "CEG_DATABASE_URL",
        "CEG_USE_X_FORWARDED_FOR",
        "CEG_USE_FORWARDED",
        "CEG_JWT_LEEWAY_SECS",
        "CEG_PAYSTACK_BASE_URL",
        "CEG_PAYSTACK_CALLBACK_URL",
        "CEG_PAYSTACK_SIGNATURE_CHECKS",
        "CEG_MPESA_ENVIRONMENT",
        "CEG_MPESA_BASE_URL",
        "CEG_MPESA_SHORTCODE",
        "CEG_MPESA_CALLBACK_URL",
        "CEG_MPESA_IP_WHITELIST",
        "CEG_PROVIDER_TIMEOUT_SECS",
        "CEG_PROVIDER_MAX_ATTEMPTS",
        "CEG_PLATFORM_FEE_BPS",
        "CEG_CLEARING_DELAY_DAYS",
        "CEG_LOW_PAYOUT_CAP",
        "CEG_FIRST_PAYOUT_DELAY_DAYS",
        "CEG_PAYOUT_FEE",
        "CEG_CLEARING_INTERVAL_SECS",
        "CEG_RECONCILIATION_INTERVAL_SECS",
        "CEG_STALE_PAYMENT_MINUTES",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
