mod artifact;
mod chain;
mod config;
mod deploy;
mod failure;
mod record;
mod token;

use chain::EthersBackend;
use clap::Parser;
use config::DeployConfig;
use deploy::{DeployOutcome, DeployReport};
use ethers::prelude::{Http, LocalWallet, Provider, SignerMiddleware};
use ethers::providers::Middleware;
use ethers::signers::Signer;
use ethers::utils::to_checksum;
use eyre::{eyre, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "token-deployer",
    version,
    about = "Deploy a compiled token contract, wait for confirmations and record the result"
)]
struct Args {
    /// Network to deploy to (a built-in name or one defined in --config).
    #[arg(long, env = "DEPLOY_NETWORK", default_value = "sepolia")]
    network: String,

    /// Contract name; its artifact is looked up under --artifacts.
    #[arg(long, default_value = "MyConfidentialToken")]
    contract: String,

    /// Directory holding compiled artifacts (Hardhat layout).
    #[arg(long, default_value = "artifacts")]
    artifacts: PathBuf,

    /// Explicit artifact JSON path. Skips the lookup by name.
    #[arg(long)]
    artifact: Option<PathBuf>,

    /// Optional JSON file with extra network definitions
    /// (`{ "networks": { "<name>": { "url", "urlEnvVar", "chainId", "privateKeyEnvVar" } } }`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the network's RPC URL.
    #[arg(long)]
    rpc_url: Option<String>,

    /// Environment variable name that contains the deployer's private key.
    /// Defaults to the network's setting, then PRIVATE_KEY.
    #[arg(long)]
    private_key_env: Option<String>,

    /// Block confirmations to wait for, counting the inclusion block.
    #[arg(long, default_value_t = 3)]
    confirmations: usize,

    /// Warn when the deployer holds less than this much ETH.
    #[arg(long, default_value = "0.01")]
    min_balance_eth: String,

    /// Optional fixed gas limit for the deployment transaction.
    #[arg(long)]
    gas_limit: Option<u64>,

    /// Where to write `<network>-deployment.json`.
    #[arg(long, default_value = "deployments")]
    deployments_dir: PathBuf,

    /// Don't send anything; estimate deployment gas and exit.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        // Logs go to stderr; stdout carries only the summary.
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(failure::report(&err)),
    }
}

async fn run(args: Args) -> Result<()> {
    let networks = config::load_networks(args.config.as_deref())?;

    let cfg = DeployConfig::from_cli(
        &networks,
        args.network,
        args.rpc_url,
        args.private_key_env,
        args.contract,
        args.artifacts,
        args.artifact,
        args.confirmations,
        &args.min_balance_eth,
        args.gas_limit,
        args.deployments_dir,
        args.dry_run,
    )?;

    let private_key = std::env::var(&cfg.private_key_env).map_err(|_| {
        eyre!(
            "missing private key env var '{}'. Set it in your shell or .env before running.",
            cfg.private_key_env
        )
    })?;

    let provider =
        Provider::<Http>::try_from(cfg.rpc_url.as_str())?.interval(Duration::from_millis(800));

    let remote_chain_id = provider
        .get_chainid()
        .await
        .map_err(|e| eyre!("failed to query chain id of network '{}': {e}", cfg.network))?
        .as_u64();
    cfg.check_chain_id(remote_chain_id)?;

    let wallet: LocalWallet = private_key
        .trim()
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .map_err(|e| eyre!("invalid private key in {}: {e}", cfg.private_key_env))?
        .with_chain_id(remote_chain_id);
    let signer = wallet.address();

    tracing::info!(
        network = %cfg.network,
        chain_id = remote_chain_id,
        signer = %to_checksum(&signer, None),
        "connected"
    );

    let client = Arc::new(SignerMiddleware::new(provider, wallet));
    let backend = EthersBackend::new(client, signer, cfg.gas_limit);

    match deploy::run(&backend, &cfg.plan()).await? {
        DeployOutcome::DryRun {
            estimated_gas,
            low_balance,
        } => {
            println!("dry run on {}: nothing sent", cfg.network);
            println!("estimated gas:  {estimated_gas}");
            if low_balance {
                println!("warning: deployer balance is below the configured minimum");
            }
        }
        DeployOutcome::Deployed(report) => print_summary(&report),
    }

    Ok(())
}

fn print_summary(report: &DeployReport) {
    let rec = &report.record;
    println!("contract deployed");
    println!("address:        {}", rec.contract_address);
    println!("transaction:    {}", rec.transaction_hash);
    println!("deployer:       {}", rec.deployer);
    println!("block:          {}", rec.block_number);
    println!("confirmations:  {}", report.confirmations);
    println!(
        "gas used:       {}",
        rec.gas_used.as_deref().unwrap_or("n/a")
    );
    match &report.token {
        Some(token) => println!("token:          {} ({})", token.name, token.symbol),
        None => println!("token:          verification read failed (see log)"),
    }
    println!("record:         {}", report.record_path.display());
    if report.low_balance {
        println!("warning: deployer balance was below the configured minimum");
    }
    println!();
    println!("next steps:");
    println!(
        "1. verify the contract source for {} on {}",
        rec.contract_address, rec.network
    );
    println!("2. interact with the contract at {}", rec.contract_address);
}
