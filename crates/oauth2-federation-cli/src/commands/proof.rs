use oauth2_federation::config::FederationConfig;
use oauth2_federation::federation::appsecret_proof;

use crate::cli::ProofArgs;

pub fn run(config: &FederationConfig, args: &ProofArgs) {
    println!("{}", appsecret_proof(&args.token, &config.api.app_secret));
}
