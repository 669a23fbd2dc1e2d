use axum::http::Method;
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use netgate::config::load_config;
use netgate::gate::{CallerIdentity, GateRequest, RequestGate};
use netgate::policy::{PolicySnapshot, PolicyStore};
use netgate::security::RateLimiter;

#[derive(Parser)]
#[command(name = "netgatectl")]
#[command(about = "Operator CLI for the netgate access gate", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    /// Admin API key.
    #[arg(short, long, default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file and summarize its policy
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Evaluate a hypothetical request against a config file, offline
    Check {
        #[arg(short, long)]
        config: PathBuf,
        /// Route template, e.g. /admin/settings
        #[arg(long)]
        path: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Transport peer address
        #[arg(long)]
        peer: String,
        /// Forwarded header value (repeatable)
        #[arg(long)]
        forwarded: Vec<String>,
        /// Caller role (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Show the running gate's status
    Status,
    /// Ask the running gate to reload its policy
    Reload,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Check {
            config,
            path,
            method,
            peer,
            forwarded,
            roles,
        } => check(&config, &path, &method, &peer, &forwarded, roles),
        Commands::Status => {
            let client = reqwest::Client::new();
            let res = client
                .get(format!("{}/admin/status", cli.url))
                .headers(auth_headers(&cli.key)?)
                .send()
                .await?;
            print_response(res).await
        }
        Commands::Reload => {
            let client = reqwest::Client::new();
            let res = client
                .post(format!("{}/admin/reload", cli.url))
                .headers(auth_headers(&cli.key)?)
                .send()
                .await?;
            print_response(res).await
        }
    }
}

fn validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match load_config(path) {
        Ok(config) => {
            println!("OK: {}", path.display());
            println!("  ranges:    {}", config.policy.ranges.len());
            println!("  rules:     {}", config.policy.rules.len());
            println!("  overrides: {}", config.policy.overrides.len());
            println!("  default ceiling: {}/{}s", config.policy.rate_limit.default_ceiling, config.gate.window_secs);
            Ok(())
        }
        Err(e) => {
            eprintln!("Invalid config {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn check(
    path: &Path,
    route: &str,
    method: &str,
    peer: &str,
    forwarded: &[String],
    roles: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;

    let snapshot = match PolicySnapshot::compile(&config.policy) {
        Ok(snapshot) => snapshot,
        Err(errors) => {
            for e in errors {
                eprintln!("policy error: {e}");
            }
            std::process::exit(1);
        }
    };

    let gate = RequestGate::new(
        Arc::new(PolicyStore::with_snapshot(snapshot)),
        Arc::new(RateLimiter::new(std::time::Duration::from_secs(config.gate.window_secs))),
        config.gate.trust_proxy_headers,
    );

    let forwarded: Vec<&str> = forwarded.iter().map(String::as_str).collect();
    let identity = CallerIdentity::with_roles("netgatectl", roles);
    let verdict = gate.evaluate(&GateRequest {
        route,
        method: &method,
        peer,
        forwarded: &forwarded,
        identity: &identity,
    });

    match verdict {
        Ok(admission) => {
            println!("ALLOW");
            println!("  origin:   {} ({:?})", admission.origin, admission.address_source);
            println!("  internal: {}", admission.is_internal);
            println!("  rule:     {}", if admission.explicit_rule { "explicit" } else { "fallback (internal only)" });
            println!("  category: {}", admission.category);
            println!("  ceiling:  {} ({:?})", admission.ceiling.limit, admission.ceiling.source);
        }
        Err(rejection) => {
            println!("REJECT {}", rejection.error.kind());
            println!("  status:  {}", rejection.error.status());
            println!("  reason:  {}", rejection.error);
            if let Some(origin) = rejection.origin {
                println!("  origin:  {origin}");
            }
        }
    }
    Ok(())
}

fn auth_headers(key: &str) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    Ok(headers)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
