use crate::artifact::ArtifactLookup;
use crate::chain::{DeployBackend, TokenInfo};
use crate::record::DeploymentRecord;
use chrono::Utc;
use ethers::types::U256;
use ethers::utils::{format_ether, to_checksum};
use eyre::{Result, WrapErr};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub network: String,
    pub artifact: ArtifactLookup,
    /// Total confirmations to wait for, counting the inclusion block.
    pub confirmations: usize,
    pub min_balance: U256,
    pub deployments_dir: PathBuf,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub enum DeployOutcome {
    /// Nothing was sent; gas was estimated only.
    DryRun {
        estimated_gas: U256,
        low_balance: bool,
    },
    Deployed(DeployReport),
}

#[derive(Debug, Clone)]
pub struct DeployReport {
    pub record: DeploymentRecord,
    pub record_path: PathBuf,
    pub low_balance: bool,
    pub confirmations: u64,
    /// `None` when the post-deployment read failed.
    pub token: Option<TokenInfo>,
}

/// Deploy the contract once and record the outcome.
///
/// Only the name/symbol read after confirmation is allowed to fail without
/// failing the run; every other error is returned to the caller.
pub async fn run<B: DeployBackend>(backend: &B, plan: &DeployPlan) -> Result<DeployOutcome> {
    tracing::info!(
        network = %plan.network,
        contract = %plan.artifact.contract_name,
        dry_run = plan.dry_run,
        "starting deployment"
    );

    // 1) Signer + balance precheck (warning only).
    let deployer = backend.signer_address();
    tracing::info!(deployer = %to_checksum(&deployer, None), "resolved signer");

    let balance = backend
        .balance(deployer)
        .await
        .wrap_err("failed to read deployer balance")?;
    tracing::info!(balance_eth = %format_ether(balance), "deployer balance");

    let low_balance = balance < plan.min_balance;
    if low_balance {
        tracing::warn!(
            balance_eth = %format_ether(balance),
            min_eth = %format_ether(plan.min_balance),
            "deployer balance may not cover gas fees; continuing anyway"
        );
    }

    // 2) Contract factory input.
    let artifact = plan.artifact.resolve()?;
    tracing::info!(
        contract = %artifact.contract_name,
        source = artifact.source_name.as_deref().unwrap_or(""),
        bytecode_len = artifact.bytecode.len(),
        "loaded contract artifact"
    );

    if plan.dry_run {
        let estimated_gas = backend.estimate_deploy_gas(&artifact).await?;
        tracing::info!(estimated_gas = %estimated_gas, "DRY RUN: would deploy contract");
        return Ok(DeployOutcome::DryRun {
            estimated_gas,
            low_balance,
        });
    }

    // 3) Submit and wait for inclusion.
    tracing::info!("submitting deployment transaction");
    let submitted = backend.deploy(&artifact).await?;
    tracing::info!(
        address = %to_checksum(&submitted.address, None),
        tx = ?submitted.tx_hash,
        block = submitted.block_number,
        gas_used = %submitted.gas_used.map(|g| g.to_string()).unwrap_or_else(|| "n/a".to_string()),
        "contract deployed"
    );

    // 4) Extra confirmations.
    tracing::info!(
        confirmations = plan.confirmations,
        "waiting for block confirmations"
    );
    let confirmed = backend
        .wait_for_confirmations(submitted.tx_hash, plan.confirmations)
        .await?;
    tracing::info!(
        confirmations = confirmed.confirmations,
        block = confirmed.block_number,
        "deployment confirmed"
    );

    // 5) Read-only sanity check. The contract is already on chain, so a failure
    // here is reported and otherwise ignored.
    let token = match backend.token_metadata(submitted.address).await {
        Ok(info) => {
            tracing::info!(name = %info.name, symbol = %info.symbol, "contract verified");
            Some(info)
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                "contract verification failed; the deployment itself may still have succeeded"
            );
            None
        }
    };

    // 6) Persist.
    let record = DeploymentRecord::new(
        submitted.address,
        submitted.tx_hash,
        deployer,
        &plan.network,
        confirmed.gas_used.or(submitted.gas_used),
        confirmed.block_number,
        Utc::now(),
    );

    if let Some(prev) = DeploymentRecord::load_existing(&plan.deployments_dir, &plan.network) {
        tracing::info!(
            previous = %prev.contract_address,
            previous_at = %prev.timestamp,
            "overwriting previous deployment record"
        );
    }

    let record_path = record.save(&plan.deployments_dir)?;
    tracing::info!(path = %record_path.display(), "deployment record saved");

    Ok(DeployOutcome::Deployed(DeployReport {
        record,
        record_path,
        low_balance,
        confirmations: confirmed.confirmations,
        token,
    }))
}
