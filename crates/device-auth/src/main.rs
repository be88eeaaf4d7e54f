//! Device Auth
//!
//! Checks bearer tokens read line by line from stdin and prints one JSON
//! verdict per line on stdout. Logs go to stderr.

use device_auth::observability::{logging, metrics};
use device_auth::{AuthenticatedDevice, TokenAuthenticator, TokenConfig};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

/// One output line.
#[derive(Serialize)]
struct Verdict<'a> {
    authenticated: bool,
    #[serde(flatten)]
    device: Option<&'a AuthenticatedDevice>,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing(env_flag("DEVICE_AUTH_LOG_JSON"));

    let metrics_handle = metrics::init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let config = TokenConfig::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if !config.enabled {
        error!("OAuth token authentication is disabled; set OAUTH_ENABLED=true");
        return Err("OAuth token authentication is disabled".into());
    }

    info!(
        jwks_url = ?config.jwks_url,
        issuer = ?config.issuer,
        audience = ?config.audience,
        clock_skew_seconds = config.clock_skew_seconds,
        "Configuration loaded successfully"
    );

    let authenticator = TokenAuthenticator::from_config(config).map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut checked: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        let device = authenticator.authenticate(line.trim_end_matches('\r')).await;
        let verdict = Verdict {
            authenticated: device.is_some(),
            device: device.as_ref(),
        };

        let mut out = serde_json::to_vec(&verdict)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
        checked += 1;
    }

    info!(tokens = checked, "Input exhausted");

    if env_flag("DEVICE_AUTH_PRINT_METRICS") {
        eprint!("{}", metrics_handle.render());
    }

    Ok(())
}
