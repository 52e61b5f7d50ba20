//! gateway-check
//!
//! Operator tool for the payment gateway layer.
//!
//! ```bash
//! # List every gateway with its configuration state and capabilities
//! gateway-check
//!
//! # Ask a provider for the current state of a transaction
//! gateway-check verify paymob 192837465
//! ```
//!
//! Configuration comes from `PAYMENTS_CONFIG` (optional file path) and
//! `PAYMENTS__*` environment variables. `RUST_LOG` sets the log filter and
//! `LOG_FORMAT=json` switches to JSON log lines.

use academy_payments::config::GatewaysConfig;
use academy_payments::payments::{
    redact, GatewayRegistry, Metadata, PaymentGateway, StaticExchangeRates,
};
use anyhow::{bail, Context};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config_path = std::env::var("PAYMENTS_CONFIG").ok().map(PathBuf::from);
    let config = GatewaysConfig::load(config_path.as_deref())
        .context("loading payment configuration")?;

    let rates = Arc::new(StaticExchangeRates::from_config(&config.exchange_rates));
    let registry =
        GatewayRegistry::from_config(&config, rates).context("building gateway registry")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["list"] => {
            for gateway in registry.iter() {
                describe(gateway);
            }
            Ok(())
        }
        ["verify", provider, transaction_id] => {
            let Some(gateway) = registry.get_by_name(provider) else {
                bail!("unknown payment provider '{}'", provider);
            };
            if !gateway.is_configured() {
                bail!("{} is not configured", gateway.name());
            }

            tracing::info!(provider = gateway.name(), transaction_id, "Verifying transaction");
            let result = gateway.verify_payment(transaction_id, &Metadata::new()).await;
            let output = redact(&serde_json::to_value(&result)?);
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        _ => bail!("usage: gateway-check [list | verify <provider> <transaction-id>]"),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn describe(gateway: &dyn PaymentGateway) {
    let mut capabilities = Vec::new();
    if gateway.as_webhooks().is_some() {
        capabilities.push("webhooks");
    }
    if gateway.as_refunds().is_some() {
        capabilities.push("refunds");
    }
    if gateway.as_voids().is_some() {
        capabilities.push("voids");
    }
    if gateway
        .as_tokenization()
        .is_some_and(|tokenization| tokenization.supports_tokenization())
    {
        capabilities.push("tokenization");
    }

    tracing::info!(
        name = gateway.name(),
        display_name = gateway.display_name(),
        flow = ?gateway.flow_type(),
        methods = ?gateway.supported_methods(),
        configured = gateway.is_configured(),
        capabilities = ?capabilities,
        "Payment gateway"
    );
}
