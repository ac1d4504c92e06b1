use async_trait::async_trait;
use chainpilot_core::{Address, Bytes};
use chainpilot_rpc_client::{EthApi, RpcError, RpcResult, TransactionRequest, Transport};
use chainpilot_wallets::{
    AccountBook, Keyring, MemoryHistory, RemoteSigner, Signer, TransactionHistory,
    TransactionRecord, TxStatus, WalletError, WalletResult,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

fn addr(byte: u8) -> Address {
    Address::new([byte; 20])
}

#[derive(Default)]
struct StubSigner {
    created: AtomicU8,
}

#[async_trait]
impl Signer for StubSigner {
    async fn sign_transaction(&self, _tx: &TransactionRequest) -> WalletResult<Bytes> {
        Ok(Bytes(vec![0x01]))
    }

    fn can_sign(&self, _address: &Address) -> bool {
        true
    }

    async fn create_account(&self) -> WalletResult<Address> {
        Ok(addr(self.created.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

#[tokio::test]
async fn agent_account_is_created_once_per_label() {
    let signer = Arc::new(StubSigner::default());
    let book = AccountBook::new(signer.clone());

    let first = book.agent_account("gnosis:7").await.unwrap();
    let again = book.agent_account("gnosis:7").await.unwrap();
    let other = book.agent_account("gnosis:8").await.unwrap();

    assert_eq!(first, again);
    assert_ne!(first, other);
    assert_eq!(signer.created.load(Ordering::SeqCst), 2);
    assert_eq!(book.resolve("gnosis:7"), Some(first));
}

#[tokio::test]
async fn multisig_registration_is_validated() {
    let book = AccountBook::new(Arc::new(StubSigner::default()));

    let err = book
        .register_multisig("safe", addr(9), vec![addr(1)], 2)
        .unwrap_err();
    assert!(matches!(err, WalletError::Multisig(_)));
    assert!(!book.is_multisig(&addr(9)));

    book.register_multisig("safe", addr(9), vec![addr(1)], 1)
        .unwrap();
    assert!(book.is_multisig(&addr(9)));
    assert_eq!(book.multisig(&addr(9)).unwrap().threshold, 1);
    assert_eq!(book.resolve("safe"), Some(addr(9)));
}

#[tokio::test]
async fn agent_label_cannot_shadow_multisig() {
    let book = AccountBook::new(Arc::new(StubSigner::default()));
    book.register_multisig("shared", addr(9), vec![addr(1)], 1)
        .unwrap();
    assert!(book.agent_account("shared").await.is_err());
}

struct SignerNode;

#[async_trait]
impl Transport for SignerNode {
    async fn request(&self, method: &str, _params: Value) -> RpcResult<Value> {
        match method {
            "eth_accounts" => Ok(json!(["0x0101010101010101010101010101010101010101"])),
            "eth_signTransaction" => Ok(json!("0x02f8")),
            "personal_newAccount" => Ok(json!("0x0505050505050505050505050505050505050505")),
            other => Err(RpcError::json_rpc(-32601, format!("{other} not supported"))),
        }
    }

    fn url(&self) -> &str {
        "mock://signer"
    }
}

#[tokio::test]
async fn remote_signer_tracks_accounts() {
    let signer = RemoteSigner::connect(EthApi::new(Arc::new(SignerNode)), "pw")
        .await
        .unwrap();
    assert!(signer.can_sign(&addr(1)));
    assert!(!signer.can_sign(&addr(5)));

    let tx = TransactionRequest {
        from: addr(5),
        ..TransactionRequest::default()
    };
    assert!(matches!(
        signer.sign_transaction(&tx).await,
        Err(WalletError::UnknownSigner(_))
    ));

    let created = signer.create_account().await.unwrap();
    assert_eq!(created, addr(5));
    let raw = signer.sign_transaction(&tx).await.unwrap();
    assert_eq!(raw.0, vec![0x02, 0xf8]);
    assert_eq!(signer.accounts().len(), 2);
}

#[tokio::test]
async fn memory_history_keeps_order() {
    let history = MemoryHistory::new();
    for byte in 1..=2u8 {
        history
            .log_transaction(TransactionRecord {
                hash: chainpilot_core::H256::new([byte; 32]),
                from: addr(1),
                to: addr(2),
                token: None,
                amount: 0,
                network: "gnosis".into(),
                status: TxStatus::Confirmed,
                tags: vec!["test".into()],
                gas_cost: Some(21_000),
                timestamp: chrono::Utc::now(),
            })
            .await
            .unwrap();
    }
    let records = history.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].hash.as_bytes()[0], 1);
}
