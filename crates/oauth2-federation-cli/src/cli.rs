use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "oauth2-federation")]
#[command(about = "Check federation configuration and call the identity provider API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (environment variables override its values)
    #[arg(
        short,
        long,
        global = true,
        env = "OAUTH2_FEDERATION_CONFIG",
        default_value = "oauth2-federation.toml"
    )]
    pub config: PathBuf,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration, then wire the provider
    CheckConfig,
    /// Print the app secret proof for an access token
    Proof(ProofArgs),
    /// Send a signed request to the provider API
    Query(QueryArgs),
}

#[derive(clap::Args)]
pub struct ProofArgs {
    /// Access token to sign
    #[arg(short, long)]
    pub token: String,
}

#[derive(clap::Args)]
pub struct QueryArgs {
    /// Resource path, e.g. /oauth2/v3/userinfo
    pub resource: String,
    /// Access token sent with the request
    #[arg(short, long)]
    pub token: String,
    /// HTTP method
    #[arg(short, long, default_value = "get")]
    pub method: HttpMethod,
}

#[derive(Clone, Copy, ValueEnum, Default, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}
