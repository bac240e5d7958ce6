//! Modelrelay CLI - routing diagnostics for a model aggregator

use std::sync::Arc;

use clap::{Parser, Subcommand};
use modelrelay_core::ModelRelay;
use modelrelay_core::catalog::Tier;
use modelrelay_core::config::RelayConfig;
use modelrelay_core::credentials::{EnvCredentials, looks_like_github_token};
use modelrelay_core::llm::{ChatRequest, Message};
use modelrelay_core::routing::FallbackSelector;
use tracing::warn;

#[derive(Parser)]
#[command(name = "modelrelay")]
#[command(author, version, about = "Rate-limit aware model routing diagnostics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog models grouped by tier
    Catalog {
        /// Only show one tier (high, low, custom, embedding)
        #[arg(short, long)]
        tier: Option<Tier>,
    },

    /// Show same-tier substitutes for a model, in selection order
    Fallbacks {
        /// Model id (optionally prefixed, e.g. github/openai/gpt-4.1)
        model: String,
    },

    /// Run one routed completion and print the routing trail
    Complete {
        /// Requested model id
        model: String,
        /// User prompt
        prompt: String,
        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,
    },

    /// Configuration inspection
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show every configuration value
    Show,
    /// Get one configuration value
    Get {
        /// Configuration key (e.g., catalog.ttl_secs)
        key: String,
    },
    /// Show the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pick up tokens from a local .env when present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("modelrelay=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog { tier } => cmd_catalog(tier, cli.format, cli.quiet).await,
        Commands::Fallbacks { model } => cmd_fallbacks(&model, cli.format, cli.quiet).await,
        Commands::Complete {
            model,
            prompt,
            max_tokens,
            temperature,
        } => {
            cmd_complete(&model, &prompt, max_tokens, temperature, cli.format, cli.quiet).await
        }
        Commands::Config { action } => cmd_config(action, cli.format),
    }
}

fn build_relay() -> anyhow::Result<(RelayConfig, ModelRelay)> {
    let config = RelayConfig::load()?;

    if let Ok(Some(token)) = config.upstream.resolved_api_key()
        && !looks_like_github_token(&token)
    {
        warn!("Upstream token does not look like a GitHub token; the aggregator may reject it");
    }

    let relay = ModelRelay::from_config(&config, Arc::new(EnvCredentials))?;
    Ok((config, relay))
}

async fn cmd_catalog(tier: Option<Tier>, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let (config, relay) = build_relay()?;
    let snapshot = relay.catalog().get().await?;

    let tiers: Vec<Tier> = match tier {
        Some(tier) => vec![tier],
        None => Tier::ALL.to_vec(),
    };

    match format {
        OutputFormat::Json => {
            let models: Vec<_> = snapshot
                .iter()
                .filter(|m| tiers.contains(&m.tier))
                .map(|m| &**m)
                .collect();
            println!("{}", serde_json::to_string_pretty(&models)?);
        }
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "Catalog v{} ({} models, prefix '{}')",
                    snapshot.version(),
                    snapshot.len(),
                    config.upstream.model_prefix
                );
            }
            for tier in tiers {
                let models: Vec<_> = snapshot.in_tier(tier).collect();
                if models.is_empty() {
                    continue;
                }
                println!();
                println!("{} ({}):", tier.to_string().to_uppercase(), models.len());
                for model in models {
                    if quiet {
                        println!("  {}", model.id);
                    } else {
                        let capabilities: Vec<&str> =
                            model.capabilities.iter().map(String::as_str).collect();
                        println!("  {:<45} {}", model.id, capabilities.join(", "));
                    }
                }
            }
        }
    }
    Ok(())
}

async fn cmd_fallbacks(model: &str, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let (_, relay) = build_relay()?;
    let snapshot = relay.catalog().get().await?;
    let order = FallbackSelector::new().fallback_order(model, &snapshot)?;

    match format {
        OutputFormat::Json => {
            let ids: Vec<&str> = order.iter().map(|m| m.id.as_str()).collect();
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        OutputFormat::Text => {
            if !quiet {
                let tier = snapshot
                    .tier_of(model)
                    .map(|t| t.to_string())
                    .unwrap_or_default();
                println!("Fallbacks for {} (tier {}):", model, tier);
                if order.is_empty() {
                    println!("  (none - no other models in this tier)");
                }
            }
            for (i, candidate) in order.iter().enumerate() {
                println!("  {}. {}", i + 1, candidate.id);
            }
        }
    }
    Ok(())
}

async fn cmd_complete(
    model: &str,
    prompt: &str,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let (_, relay) = build_relay()?;

    let mut request = ChatRequest::new(vec![Message::user(prompt)]);
    if let Some(max_tokens) = max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = temperature {
        request = request.with_temperature(temperature);
    }

    let outcome = match relay.complete(model, &request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(suggestion) = e.suggestion() {
                eprintln!("[{}] {}", e.code(), suggestion);
            }
            return Err(e.into());
        }
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "request_id": outcome.request_id,
                "requested_model": &outcome.requested_model,
                "served_by": outcome.served_by(),
                "was_substituted": outcome.was_substituted(),
                "decisions": &outcome.decisions,
                "content": &outcome.response.content,
                "tokens_used": outcome.response.tokens_used(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if !quiet {
                println!("Routing trail:");
                for decision in &outcome.decisions {
                    println!(
                        "  #{} {}{} -> {}",
                        decision.attempt,
                        decision.model_id,
                        if decision.was_substituted {
                            " (substitute)"
                        } else {
                            ""
                        },
                        decision.outcome
                    );
                }
                println!();
            }
            println!("{}", outcome.response.content);
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = RelayConfig::load()?;
            let items = config.list()?;
            match format {
                OutputFormat::Json => {
                    let map: serde_json::Map<String, serde_json::Value> = items
                        .into_iter()
                        .map(|(k, v)| (k, serde_json::Value::String(v)))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&map)?);
                }
                OutputFormat::Text => {
                    for (key, value) in items {
                        println!("{} = {}", key, value);
                    }
                }
            }
        }
        ConfigAction::Get { key } => {
            let config = RelayConfig::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Path => {
            let path = RelayConfig::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
