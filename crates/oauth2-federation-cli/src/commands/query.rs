use anyhow::{Context, Result};
use colored::Colorize;
use oauth2_federation::config::FederationConfig;
use oauth2_federation::federation::SignedApiClient;
use serde_json::Value;

use crate::cli::QueryArgs;

pub async fn run(config: &FederationConfig, args: &QueryArgs) -> Result<()> {
    let client = SignedApiClient::new(&config.api)?;
    let response = client
        .query(&args.resource, args.method.into(), &args.token)
        .await
        .with_context(|| format!("Request to {}{} failed", client.endpoint(), args.resource))?;

    let status = response.status();
    let body = response.text().await?;

    let status_line = status.to_string();
    if status.is_success() {
        eprintln!("{}", status_line.green());
    } else {
        eprintln!("{}", status_line.red());
    }

    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }

    if !status.is_success() {
        anyhow::bail!("Provider answered {status}");
    }
    Ok(())
}
