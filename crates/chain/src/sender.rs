//! Signs, broadcasts and confirms transactions.
//!
//! One logical send keeps a single nonce for its whole life. Every re-sign
//! (after a fee rejection) reuses it, so at most one of the signed variants
//! can ever be mined. Before each broadcast attempt the locally computed hash
//! is looked up, which keeps a retried broadcast from submitting a
//! transaction the node already accepted.

use crate::error::{ChainError, ChainResult};
use crate::executor::OperationExecutor;
use chainpilot_config::TransactionConfig;
use chainpilot_core::{keccak256, Address, Bytes, Wei, H256};
use chainpilot_rpc_client::{BlockTag, ErrorKind, Receipt, RpcError, TransactionRequest};
use chainpilot_wallets::{
    Keyring, MultisigExecutor, SafeOperation, Signer, TransactionHistory, TransactionRecord,
    TxStatus, WalletError,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ALREADY_KNOWN_MARKERS: &[&str] = &["already known", "known transaction", "already imported"];

/// A transaction to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIntent {
    /// Sender; an EOA held by the signer or a registered multisig
    pub from: Address,
    /// Recipient
    pub to: Address,
    /// Attached native value
    pub value: Wei,
    /// Calldata
    pub data: Bytes,
    /// History labels
    pub tags: Vec<String>,
}

impl TxIntent {
    /// A contract call without value.
    #[must_use]
    pub fn call(from: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from,
            to,
            value: 0,
            data: data.into(),
            tags: Vec::new(),
        }
    }

    /// A plain native transfer.
    #[must_use]
    pub fn transfer(from: Address, to: Address, value: Wei) -> Self {
        Self {
            from,
            to,
            value,
            data: Bytes::new(),
            tags: Vec::new(),
        }
    }

    /// Attaches native value.
    #[must_use]
    pub fn with_value(mut self, value: Wei) -> Self {
        self.value = value;
        self
    }

    /// Adds a history tag.
    #[must_use]
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

enum Broadcast {
    Accepted(H256),
    Underpriced(RpcError),
}

fn already_known(err: &RpcError) -> bool {
    let text = err.to_string().to_ascii_lowercase();
    ALREADY_KNOWN_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Sends transactions through an [`OperationExecutor`].
pub struct TransactionSender {
    executor: Arc<OperationExecutor>,
    signer: Arc<dyn Signer>,
    keyring: Arc<dyn Keyring>,
    multisig: Option<Arc<dyn MultisigExecutor>>,
    history: Arc<dyn TransactionHistory>,
    settings: TransactionConfig,
}

impl TransactionSender {
    /// Creates a sender without multisig support.
    pub fn new(
        executor: Arc<OperationExecutor>,
        signer: Arc<dyn Signer>,
        keyring: Arc<dyn Keyring>,
        history: Arc<dyn TransactionHistory>,
        settings: TransactionConfig,
    ) -> Self {
        Self {
            executor,
            signer,
            keyring,
            multisig: None,
            history,
            settings,
        }
    }

    /// Routes sends from registered multisig accounts through `multisig`.
    #[must_use]
    pub fn with_multisig(mut self, multisig: Arc<dyn MultisigExecutor>) -> Self {
        self.multisig = Some(multisig);
        self
    }

    /// Executor used for every call.
    #[must_use]
    pub fn executor(&self) -> &Arc<OperationExecutor> {
        &self.executor
    }

    /// Signs, broadcasts and waits for the receipt of `intent`.
    ///
    /// Returns the receipt of a successful transaction; a mined revert is
    /// reported as [`ChainError::Reverted`].
    pub async fn send(&self, intent: TxIntent) -> ChainResult<Receipt> {
        let via_multisig = self.keyring.is_multisig(&intent.from);
        let hash = if via_multisig {
            self.send_via_multisig(&intent).await?
        } else {
            self.send_signed(&intent).await?
        };

        let receipt = self
            .executor
            .wait_for_receipt(
                hash,
                self.settings.receipt_timeout(),
                self.settings.receipt_poll(),
            )
            .await?;

        if !via_multisig {
            match self
                .executor
                .wait_for_no_pending(
                    intent.from,
                    self.settings.pending_wait(),
                    self.settings.pending_poll(),
                )
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(from = %intent.from, tx_hash = %hash, "sender still has pending transactions");
                }
                Err(err) => {
                    warn!(from = %intent.from, tx_hash = %hash, error = %err, "could not check pending transactions");
                }
            }
        }

        self.record(&intent, &receipt).await;

        if !receipt.succeeded() {
            warn!(tx_hash = %hash, tags = ?intent.tags, "transaction reverted");
            return Err(ChainError::Reverted { hash });
        }
        info!(
            network = %self.executor.network().name,
            tx_hash = %hash,
            block = receipt.block_number,
            gas_used = receipt.gas_used,
            tags = ?intent.tags,
            "transaction confirmed"
        );
        Ok(receipt)
    }

    async fn send_via_multisig(&self, intent: &TxIntent) -> ChainResult<H256> {
        let multisig = self.multisig.as_ref().ok_or_else(|| {
            WalletError::multisig(format!("no multisig executor configured for {}", intent.from))
        })?;
        let hash = multisig
            .execute_multisig_transaction(
                intent.from,
                intent.to,
                intent.value,
                &intent.data,
                SafeOperation::Call,
            )
            .await?;
        info!(safe = %intent.from, to = %intent.to, tx_hash = %hash, "multisig transaction submitted");
        Ok(hash)
    }

    async fn send_signed(&self, intent: &TxIntent) -> ChainResult<H256> {
        let from = intent.from;
        if !self.signer.can_sign(&from) {
            return Err(ChainError::UnknownSigner(from));
        }

        let nonce = self
            .executor
            .run("pending_nonce", |api| async move {
                api.transaction_count(from, BlockTag::Pending).await
            })
            .await?;

        let mut tx = TransactionRequest::call(from, intent.to, intent.value, intent.data.clone());
        tx.nonce = Some(nonce);
        tx.chain_id = Some(self.executor.network().chain_id);

        let mut gas = match self.executor.estimate_gas(&tx).await? {
            0 => self.settings.fallback_gas_limit,
            gas => gas,
        };
        tx.gas = Some(gas);
        let mut fees = self.executor.estimate_fees().await?;
        fees.apply(&mut tx);

        let required = intent
            .value
            .saturating_add(Wei::from(gas).saturating_mul(fees.max_price_per_gas()));
        let available = self.executor.native_balance(from).await?;
        if available < required {
            warn!(%from, required, available, "insufficient funds, not sending");
            return Err(ChainError::InsufficientFunds {
                address: from,
                required,
                available,
            });
        }

        let mut bumps = 0u32;
        loop {
            let raw = self.signer.sign_transaction(&tx).await?;
            let local_hash = keccak256(&raw);
            debug!(%from, nonce, gas, tx_hash = %local_hash, "broadcasting");

            let outcome = self
                .executor
                .run("send_raw_transaction", |api| {
                    let raw = raw.clone();
                    async move {
                        if api.transaction_by_hash(local_hash).await?.is_some() {
                            return Ok(Broadcast::Accepted(local_hash));
                        }
                        match api.send_raw_transaction(&raw).await {
                            Ok(hash) => Ok(Broadcast::Accepted(hash)),
                            Err(err) if already_known(&err) => Ok(Broadcast::Accepted(local_hash)),
                            Err(err) if err.kind() == ErrorKind::FeeRelated => {
                                Ok(Broadcast::Underpriced(err))
                            }
                            Err(err) => Err(err),
                        }
                    }
                })
                .await?;

            let rejection = match outcome {
                Broadcast::Accepted(hash) => {
                    info!(%from, nonce, tx_hash = %hash, "transaction broadcast");
                    return Ok(hash);
                }
                Broadcast::Underpriced(err) => err,
            };

            if bumps >= self.settings.fee_bump_attempts {
                warn!(%from, nonce, bumps, error = %rejection, "fee bumps exhausted");
                return Err(ChainError::Exhausted {
                    operation: "send_raw_transaction".to_string(),
                    attempts: bumps + 1,
                    source: rejection,
                });
            }
            bumps += 1;

            gas = gas.saturating_add(gas / 2);
            tx.gas = Some(gas);
            let fresh = self.executor.estimate_fees().await?;
            fees = fees.bumped().at_least(&fresh);
            fees.apply(&mut tx);
            warn!(
                %from,
                nonce,
                bump = bumps,
                gas,
                max_fee = fees.max_price_per_gas(),
                error = %rejection,
                "fee rejected, re-signing with higher fees"
            );
        }
    }

    async fn record(&self, intent: &TxIntent, receipt: &Receipt) {
        let record = TransactionRecord {
            hash: receipt.transaction_hash,
            from: intent.from,
            to: intent.to,
            token: None,
            amount: intent.value,
            network: self.executor.network().name.clone(),
            status: if receipt.succeeded() {
                TxStatus::Confirmed
            } else {
                TxStatus::Reverted
            },
            tags: intent.tags.clone(),
            gas_cost: receipt.fee_paid(),
            timestamp: chrono::Utc::now(),
        };
        if let Err(err) = self.history.log_transaction(record).await {
            warn!(tx_hash = %receipt.transaction_hash, error = %err, "failed to record transaction history");
        }
    }
}
