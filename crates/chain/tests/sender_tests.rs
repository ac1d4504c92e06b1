mod support;

use async_trait::async_trait;
use chainpilot_chain::{ChainError, TransactionSender, TxIntent};
use chainpilot_config::TransactionConfig;
use chainpilot_core::{Address, Bytes, Wei, H256};
use chainpilot_rpc_client::{RpcError, TransactionRequest};
use chainpilot_wallets::{
    AccountBook, Keyring, MemoryHistory, MultisigExecutor, SafeOperation, Signer, TxStatus,
    WalletResult,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use support::{executor_for, receipt_json, timeout, MockNode, TX_HASH};

const OWNER: Address = Address::new([1; 20]);
const TARGET: Address = Address::new([2; 20]);

/// Signs by serializing the request, so every variant has a distinct hash.
#[derive(Default)]
struct RecordingSigner {
    signed: Mutex<Vec<TransactionRequest>>,
}

#[async_trait]
impl Signer for RecordingSigner {
    async fn sign_transaction(&self, tx: &TransactionRequest) -> WalletResult<Bytes> {
        self.signed.lock().push(tx.clone());
        Ok(Bytes(serde_json::to_vec(tx).unwrap()))
    }

    fn can_sign(&self, address: &Address) -> bool {
        *address == OWNER
    }

    async fn create_account(&self) -> WalletResult<Address> {
        Ok(Address::new([7; 20]))
    }
}

struct StubSafe {
    calls: Mutex<Vec<(Address, Address, Wei)>>,
}

#[async_trait]
impl MultisigExecutor for StubSafe {
    async fn execute_multisig_transaction(
        &self,
        safe: Address,
        to: Address,
        value: Wei,
        _data: &Bytes,
        operation: SafeOperation,
    ) -> WalletResult<H256> {
        assert_eq!(operation, SafeOperation::Call);
        self.calls.lock().push((safe, to, value));
        Ok(TX_HASH.parse().unwrap())
    }
}

struct Harness {
    node: Arc<MockNode>,
    signer: Arc<RecordingSigner>,
    keyring: Arc<AccountBook>,
    history: Arc<MemoryHistory>,
    sender: TransactionSender,
}

fn harness(node: Arc<MockNode>) -> Harness {
    let executor = Arc::new(executor_for(&[node.clone()]));
    let signer = Arc::new(RecordingSigner::default());
    let keyring = Arc::new(AccountBook::new(signer.clone()));
    let history = Arc::new(MemoryHistory::new());
    let sender = TransactionSender::new(
        executor,
        signer.clone(),
        keyring.clone(),
        history.clone(),
        TransactionConfig::default(),
    );
    Harness {
        node,
        signer,
        keyring,
        history,
        sender,
    }
}

fn intent() -> TxIntent {
    TxIntent::call(OWNER, TARGET, vec![0xab, 0xcd]).tagged("unit")
}

#[tokio::test(start_paused = true)]
async fn send_signs_once_and_records_history() {
    let h = harness(MockNode::healthy("http://node.test"));

    let receipt = h.sender.send(intent()).await.unwrap();
    assert!(receipt.succeeded());
    assert_eq!(receipt.transaction_hash, TX_HASH.parse().unwrap());

    let signed = h.signer.signed.lock().clone();
    assert_eq!(signed.len(), 1);
    assert_eq!(signed[0].nonce, Some(3));
    assert_eq!(signed[0].chain_id, Some(100));
    assert_eq!(signed[0].gas, Some(23_100));
    assert_eq!(signed[0].max_fee_per_gas, Some(152));
    assert_eq!(h.node.calls("eth_sendRawTransaction"), 1);

    let records = h.history.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TxStatus::Confirmed);
    assert_eq!(records[0].tags, vec!["unit".to_string()]);
    assert_eq!(records[0].gas_cost, Some(21_000 * 0x98));
}

#[tokio::test(start_paused = true)]
async fn underpriced_send_is_bumped_with_same_nonce() {
    let node = MockNode::healthy("http://node.test");
    node.sequence(
        "eth_sendRawTransaction",
        vec![
            Err(RpcError::json_rpc(-32000, "replacement transaction underpriced")),
            Ok(json!(TX_HASH)),
        ],
    );
    let h = harness(node);

    h.sender.send(intent()).await.unwrap();

    let signed = h.signer.signed.lock().clone();
    assert_eq!(signed.len(), 2);
    assert_eq!(signed[0].nonce, signed[1].nonce);
    assert_eq!(signed[1].gas, Some(34_650));
    assert!(signed[1].max_fee_per_gas.unwrap() >= signed[0].max_fee_per_gas.unwrap() * 9 / 8);
    assert!(
        signed[1].max_priority_fee_per_gas.unwrap()
            > signed[0].max_priority_fee_per_gas.unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn fee_bumps_are_bounded() {
    let node = MockNode::healthy("http://node.test");
    node.fail(
        "eth_sendRawTransaction",
        RpcError::json_rpc(-32000, "intrinsic gas too low"),
    );
    let h = harness(node);

    let result = h.sender.send(intent()).await;
    assert!(matches!(result, Err(ChainError::Exhausted { attempts: 4, .. })));
    assert_eq!(h.signer.signed.lock().len(), 4);
    assert!(h.history.records().is_empty());
}

#[tokio::test]
async fn insufficient_funds_sends_nothing() {
    let node = MockNode::healthy("http://node.test");
    node.reply("eth_getBalance", json!("0x0"));
    let h = harness(node);

    let result = h.sender.send(intent().with_value(1)).await;
    match result {
        Err(ChainError::InsufficientFunds {
            required,
            available,
            ..
        }) => {
            assert_eq!(available, 0);
            assert_eq!(required, 1 + 23_100 * 152);
        }
        other => panic!("expected insufficient funds, got {other:?}"),
    }
    assert_eq!(h.node.calls("eth_sendRawTransaction"), 0);
    assert!(h.signer.signed.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn transaction_seen_by_node_is_not_rebroadcast() {
    let node = MockNode::healthy("http://node.test");
    node.handle("eth_getTransactionByHash", |params: &Value| {
        Ok(json!({"hash": params[0], "nonce": "0x3", "blockNumber": null}))
    });
    let h = harness(node);

    h.sender.send(intent()).await.unwrap();
    assert_eq!(h.node.calls("eth_sendRawTransaction"), 0);
    assert_eq!(h.node.calls("eth_getTransactionReceipt"), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_broadcast_response_does_not_resubmit() {
    let node = MockNode::healthy("http://node.test");
    // The first broadcast reaches the node but the reply is lost.
    node.fail("eth_sendRawTransaction", timeout());
    let seen = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&seen);
    node.handle("eth_getTransactionByHash", move |params: &Value| {
        let mut seen = flag.lock();
        if *seen {
            Ok(json!({"hash": params[0], "nonce": "0x3", "blockNumber": null}))
        } else {
            *seen = true;
            Ok(Value::Null)
        }
    });
    let h = harness(node);

    h.sender.send(intent()).await.unwrap();
    assert_eq!(h.node.calls("eth_sendRawTransaction"), 1);
    assert_eq!(h.signer.signed.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn receipt_timeout_is_not_resubmitted() {
    let node = MockNode::healthy("http://node.test");
    node.reply("eth_getTransactionReceipt", Value::Null);
    let h = harness(node);

    let result = h.sender.send(intent()).await;
    assert!(matches!(result, Err(ChainError::ReceiptTimeout { .. })));
    assert_eq!(h.node.calls("eth_sendRawTransaction"), 1);
}

#[tokio::test(start_paused = true)]
async fn mined_transaction_survives_failed_pending_check() {
    let node = MockNode::healthy("http://node.test");
    node.sequence(
        "eth_getTransactionCount",
        vec![
            Ok(json!("0x3")),
            Err(RpcError::json_rpc(-32601, "the method eth_getTransactionCount does not exist")),
        ],
    );
    let h = harness(node);

    let receipt = h.sender.send(intent()).await.unwrap();

    assert!(receipt.succeeded());
    assert_eq!(h.signer.signed.lock()[0].nonce, Some(3));
    let records = h.history.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TxStatus::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn reverted_receipt_is_an_error_and_recorded() {
    let node = MockNode::healthy("http://node.test");
    node.handle("eth_getTransactionReceipt", |params: &Value| {
        Ok(receipt_json(&params[0], 0))
    });
    let h = harness(node);

    let result = h.sender.send(intent()).await;
    assert!(matches!(result, Err(ChainError::Reverted { .. })));
    assert_eq!(h.history.records()[0].status, TxStatus::Reverted);
}

#[tokio::test]
async fn unknown_sender_is_rejected() {
    let h = harness(MockNode::healthy("http://node.test"));
    let result = h
        .sender
        .send(TxIntent::transfer(Address::new([9; 20]), TARGET, 5))
        .await;
    assert!(matches!(result, Err(ChainError::UnknownSigner(_))));
    assert_eq!(h.node.calls("eth_getTransactionCount"), 0);
}

#[tokio::test(start_paused = true)]
async fn multisig_sender_goes_through_executor() {
    let node = MockNode::healthy("http://node.test");
    let executor = Arc::new(executor_for(&[node.clone()]));
    let signer = Arc::new(RecordingSigner::default());
    let keyring = Arc::new(AccountBook::new(signer.clone()));
    let safe_address = Address::new([5; 20]);
    keyring
        .register_multisig("service", safe_address, vec![OWNER], 1)
        .unwrap();
    let safe = Arc::new(StubSafe {
        calls: Mutex::new(Vec::new()),
    });
    let sender = TransactionSender::new(
        executor,
        signer.clone(),
        keyring,
        Arc::new(MemoryHistory::new()),
        TransactionConfig::default(),
    )
    .with_multisig(safe.clone());

    sender
        .send(TxIntent::transfer(safe_address, TARGET, 10))
        .await
        .unwrap();

    assert_eq!(safe.calls.lock().as_slice(), &[(safe_address, TARGET, 10)]);
    assert!(signer.signed.lock().is_empty());
    assert_eq!(node.calls("eth_sendRawTransaction"), 0);
}

#[tokio::test]
async fn multisig_without_executor_fails() {
    let h = harness(MockNode::healthy("http://node.test"));
    let safe_address = Address::new([5; 20]);
    h.keyring
        .register_multisig("service", safe_address, vec![OWNER], 1)
        .unwrap();

    let result = h.sender.send(TxIntent::transfer(safe_address, TARGET, 1)).await;
    assert!(matches!(result, Err(ChainError::Wallet(_))));
}
