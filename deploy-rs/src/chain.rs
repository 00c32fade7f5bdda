use crate::artifact::ContractArtifact;
use crate::token::TokenMetadata;
use ethers::contract::ContractFactory;
use ethers::providers::Middleware;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionReceipt, H256, U256, U64};
use eyre::{eyre, Result};
use std::sync::Arc;

/// Consecutive "unknown transaction" answers after which a pending deployment
/// counts as dropped.
const DROPPED_AFTER_MISSES: u32 = 3;

/// A deployment transaction that has been mined (one confirmation).
#[derive(Debug, Clone)]
pub struct SubmittedDeployment {
    pub address: Address,
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

#[derive(Debug, Clone)]
pub struct ConfirmedDeployment {
    /// Block the transaction ended up in after waiting (may differ from the
    /// inclusion block if the chain reorganized in between).
    pub block_number: u64,
    pub gas_used: Option<U256>,
    /// Confirmations observed when the wait finished, counting the inclusion block.
    pub confirmations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
}

/// Everything the deployment procedure needs from the chain.
pub trait DeployBackend {
    fn signer_address(&self) -> Address;

    async fn balance(&self, account: Address) -> Result<U256>;

    async fn estimate_deploy_gas(&self, artifact: &ContractArtifact) -> Result<U256>;

    /// Submit the deployment transaction and wait for its inclusion.
    async fn deploy(&self, artifact: &ContractArtifact) -> Result<SubmittedDeployment>;

    async fn wait_for_confirmations(
        &self,
        tx_hash: H256,
        confirmations: usize,
    ) -> Result<ConfirmedDeployment>;

    async fn token_metadata(&self, address: Address) -> Result<TokenInfo>;
}

/// [`DeployBackend`] over an ethers signing middleware.
///
/// Waits poll at the provider's interval and stop at the first RPC error, so a
/// transport failure surfaces with its original message.
pub struct EthersBackend<M> {
    client: Arc<M>,
    signer: Address,
    gas_limit: Option<u64>,
}

impl<M: Middleware + 'static> EthersBackend<M> {
    pub fn new(client: Arc<M>, signer: Address, gas_limit: Option<u64>) -> Self {
        Self {
            client,
            signer,
            gas_limit,
        }
    }

    fn factory(&self, artifact: &ContractArtifact) -> ContractFactory<M> {
        ContractFactory::new(
            artifact.abi.clone(),
            artifact.bytecode.clone(),
            self.client.clone(),
        )
    }

    /// Creation transaction from the signer. Gas is left for the node to estimate.
    fn creation_tx(&self, artifact: &ContractArtifact) -> Result<TypedTransaction> {
        let mut deployer = self.factory(artifact).deploy(()).map_err(|e| {
            eyre!(
                "failed to build deployment transaction for {}: {e}",
                artifact.contract_name
            )
        })?;
        deployer.tx.set_from(self.signer);
        Ok(deployer.tx)
    }

    /// The transaction `deploy` sends: the creation transaction with the fixed
    /// gas limit applied, if one is configured.
    fn deployment_tx(&self, artifact: &ContractArtifact) -> Result<TypedTransaction> {
        let mut tx = self.creation_tx(artifact)?;
        if let Some(gl) = self.gas_limit {
            tx.set_gas(U256::from(gl));
        }
        Ok(tx)
    }

    /// Poll until `tx_hash` has a mined receipt.
    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TransactionReceipt> {
        let mut misses = 0;
        loop {
            let receipt = self
                .client
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| eyre!("failed to fetch receipt for {tx_hash:#x}: {e}"))?;

            match receipt {
                Some(receipt) if receipt.block_number.is_some() => return Ok(receipt),
                // some nodes hand out receipts for pending transactions
                Some(_) => misses = 0,
                None => {
                    let known = self
                        .client
                        .get_transaction(tx_hash)
                        .await
                        .map_err(|e| eyre!("failed to look up transaction {tx_hash:#x}: {e}"))?;
                    if known.is_some() {
                        misses = 0;
                    } else {
                        misses += 1;
                        if misses >= DROPPED_AFTER_MISSES {
                            return Err(eyre!(
                                "deployment transaction {tx_hash:#x} was dropped before it was mined"
                            ));
                        }
                    }
                }
            }

            tokio::time::sleep(self.client.provider().get_interval()).await;
        }
    }
}

impl<M: Middleware + 'static> DeployBackend for EthersBackend<M> {
    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn balance(&self, account: Address) -> Result<U256> {
        self.client
            .get_balance(account, None)
            .await
            .map_err(|e| eyre!("failed to read balance of {account:?}: {e}"))
    }

    async fn estimate_deploy_gas(&self, artifact: &ContractArtifact) -> Result<U256> {
        let tx = self.creation_tx(artifact)?;
        self.client
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| eyre!("failed to estimate deployment gas: {e}"))
    }

    async fn deploy(&self, artifact: &ContractArtifact) -> Result<SubmittedDeployment> {
        let tx = self.deployment_tx(artifact)?;

        let tx_hash = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| eyre!("deployment of {} failed: {e}", artifact.contract_name))?
            .tx_hash();
        tracing::info!(tx = ?tx_hash, "deployment transaction sent, waiting to be mined");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if receipt.status == Some(U64::zero()) {
            return Err(eyre!(
                "deployment transaction {tx_hash:#x} was mined but reverted"
            ));
        }

        let address = receipt
            .contract_address
            .ok_or_else(|| eyre!("receipt for {tx_hash:#x} has no contract address"))?;

        Ok(SubmittedDeployment {
            address,
            tx_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
            gas_used: receipt.gas_used,
        })
    }

    async fn wait_for_confirmations(
        &self,
        tx_hash: H256,
        confirmations: usize,
    ) -> Result<ConfirmedDeployment> {
        let wanted = confirmations.max(1) as u64;
        loop {
            // Re-read the receipt every round; a reorg can move the transaction.
            let receipt = self.wait_for_receipt(tx_hash).await?;
            let block_number = receipt
                .block_number
                .ok_or_else(|| eyre!("receipt for {tx_hash:#x} has no block number"))?
                .as_u64();

            let latest = self
                .client
                .get_block_number()
                .await
                .map_err(|e| eyre!("failed to read latest block number: {e}"))?
                .as_u64();
            let observed = latest.saturating_sub(block_number).saturating_add(1);

            if observed >= wanted {
                if receipt.status == Some(U64::zero()) {
                    return Err(eyre!(
                        "deployment transaction {tx_hash:#x} reverted after a reorg"
                    ));
                }
                return Ok(ConfirmedDeployment {
                    block_number,
                    gas_used: receipt.gas_used,
                    confirmations: observed,
                });
            }

            tracing::debug!(
                block = block_number,
                observed,
                wanted,
                "waiting for more confirmations"
            );
            tokio::time::sleep(self.client.provider().get_interval()).await;
        }
    }

    async fn token_metadata(&self, address: Address) -> Result<TokenInfo> {
        let token = TokenMetadata::new(address, self.client.clone());
        let name = token
            .name()
            .call()
            .await
            .map_err(|e| eyre!("name() call failed: {e}"))?;
        let symbol = token
            .symbol()
            .call()
            .await
            .map_err(|e| eyre!("symbol() call failed: {e}"))?;
        Ok(TokenInfo { name, symbol })
    }
}
