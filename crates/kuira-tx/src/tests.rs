use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use kuira_codec::{encode_intent, signing_message};
use kuira_crypto::{address, hd, mnemonic, schnorr};
use kuira_dust::{
    dust_public_key, encode_events, DustEvent, DustGenerationInfo, DustLocalState,
    QualifiedDustOutput,
};
use kuira_store::UtxoStore;
use kuira_sync::{
    IndexerClient, IndexerUtxo, TransactionStatus, TransactionUpdate, WalletSyncUpdate,
};
use kuira_types::{
    DustParameters, NetworkConfig, NetworkId, Result, SubmissionResult, Utxo, UtxoId, UtxoState,
    WalletError, NIGHT_TOKEN,
};

use crate::{attach_fee, build_transfer, sign_intent, NodeClient, Submitter};

const PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const DUST_SEED: [u8; 32] = [7u8; 32];

fn owner_key() -> hd::DerivedKey {
    let seed = mnemonic::phrase_to_seed(PHRASE, "").unwrap();
    hd::derive_key(&seed, 0, hd::Role::NightExternal, 0).unwrap()
}

fn owner_address(key: &hd::DerivedKey) -> String {
    address::for_public_key(NetworkId::Testnet, &key.public_key()).unwrap()
}

fn recipient_address() -> String {
    address::encode(NetworkId::Testnet, &[0x44u8; 32]).unwrap()
}

fn seeded_store(key: &hd::DerivedKey, values: &[u128]) -> UtxoStore {
    let store = UtxoStore::open_temporary().unwrap();
    let addr = owner_address(key);
    for (i, &value) in values.iter().enumerate() {
        store
            .put(&Utxo {
                id: UtxoId { intent_hash: [i as u8 + 1; 32], output_index: 0 },
                owner_address: addr.clone(),
                owner_public_key: key.public_key(),
                value,
                token_type: NIGHT_TOKEN,
                state: UtxoState::Available,
                created_at: 0,
                spent_at: None,
            })
            .unwrap();
    }
    store
}

fn dust_params() -> DustParameters {
    DustParameters {
        night_dust_ratio: 5,
        generation_decay_rate: 2,
        dust_grace_period_secs: 3600,
    }
}

fn seeded_dust(night_values: &[u128]) -> DustLocalState {
    let mut state = DustLocalState::new(dust_params(), "4.0.0");
    let pk = dust_public_key(&DUST_SEED);
    let events: Vec<DustEvent> = night_values
        .iter()
        .enumerate()
        .map(|(i, &night)| DustEvent::InitialUtxo {
            output: QualifiedDustOutput {
                initial_value: 0,
                owner: pk,
                nonce: [i as u8 + 1; 32],
                seq: 0,
                ctime: 0,
                backing_night: [i as u8 + 1; 32],
                mt_index: i as u64,
            },
            generation: DustGenerationInfo {
                night_utxo_hash: [i as u8 + 1; 32],
                value: night,
                owner: pk,
                nonce: [i as u8 + 1; 32],
                ctime: 0,
                dtime: u64::MAX,
            },
            generation_index: i as u64,
            block_time: 0,
        })
        .collect();
    state.replay(&DUST_SEED, &encode_events(&events).unwrap()).unwrap();
    state
}

#[tokio::test]
async fn build_transfer_lays_out_recipient_and_change() {
    let key = owner_key();
    let store = seeded_store(&key, &[1_500_000]);
    let sender = owner_address(&key);

    let before = kuira_types::now_ms();
    let intent = build_transfer(
        &store,
        NetworkId::Testnet,
        &sender,
        &recipient_address(),
        1_000_000,
        &NIGHT_TOKEN,
        None,
    )
    .await
    .unwrap();

    let offer = intent.guaranteed_offer.as_ref().unwrap();
    assert_eq!(offer.inputs.len(), 1);
    assert!(offer.signatures.is_empty());
    assert_eq!(offer.outputs.len(), 2);
    assert_eq!(offer.outputs[0].value, 1_000_000);
    assert_eq!(offer.outputs[0].owner_address, [0x44u8; 32]);
    assert_eq!(offer.outputs[1].value, 500_000);
    assert!(intent.ttl_ms >= before + crate::DEFAULT_TTL_MS);
    assert!(intent.ttl_ms <= kuira_types::now_ms() + crate::DEFAULT_TTL_MS);

    // The input is now reserved.
    let row = store.get(&UtxoId { intent_hash: [1u8; 32], output_index: 0 }).unwrap().unwrap();
    assert_eq!(row.state, UtxoState::Pending);
}

#[tokio::test]
async fn exact_amount_omits_the_change_output() {
    let key = owner_key();
    let store = seeded_store(&key, &[1_000_000]);
    let sender = owner_address(&key);

    let intent = build_transfer(
        &store,
        NetworkId::Testnet,
        &sender,
        &recipient_address(),
        1_000_000,
        &NIGHT_TOKEN,
        Some(9_999),
    )
    .await
    .unwrap();

    let offer = intent.guaranteed_offer.unwrap();
    assert_eq!(offer.outputs.len(), 1);
    assert_eq!(intent.ttl_ms, 9_999);
}

#[tokio::test]
async fn build_transfer_validates_caller_input() {
    let key = owner_key();
    let store = seeded_store(&key, &[1_000]);
    let sender = owner_address(&key);
    let recipient = recipient_address();

    let err = build_transfer(&store, NetworkId::Testnet, &sender, &recipient, 0, &NIGHT_TOKEN, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::AmountNonPositive));

    let err = build_transfer(&store, NetworkId::Testnet, &sender, " ", 5, &NIGHT_TOKEN, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::BlankAddress));

    let err = build_transfer(&store, NetworkId::Testnet, &sender, "not-an-address", 5, &NIGHT_TOKEN, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::AddressInvalid { .. }));

    // A mainnet recipient on a testnet wallet is rejected before any
    // reservation happens.
    let foreign = address::encode(NetworkId::Mainnet, &[1u8; 32]).unwrap();
    let err = build_transfer(&store, NetworkId::Testnet, &sender, &foreign, 5, &NIGHT_TOKEN, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::AddressInvalid { .. }));
    assert_eq!(store.balances(&sender).unwrap()[0].pending, 0);
}

#[tokio::test]
async fn signatures_verify_in_canonical_order() {
    let key = owner_key();
    let store = seeded_store(&key, &[700_000, 400_000]);
    let sender = owner_address(&key);

    let intent = build_transfer(
        &store,
        NetworkId::Testnet,
        &sender,
        &recipient_address(),
        1_000_000,
        &NIGHT_TOKEN,
        Some(5_000),
    )
    .await
    .unwrap();

    let signed = sign_intent(&intent, &key).unwrap();
    let offer = signed.guaranteed_offer.as_ref().unwrap();
    assert_eq!(offer.signatures.len(), offer.inputs.len());

    for (index, signature) in offer.signatures.iter().enumerate() {
        let message = signing_message(&signed, index).unwrap();
        assert!(schnorr::verify(&key.public_key(), &message, &signature.0));
        assert_eq!(offer.inputs[index].signature, Some(*signature));
    }

    // Signed intents encode; the signature count matches the input count.
    assert!(encode_intent(&signed).is_ok());
}

#[tokio::test]
async fn foreign_key_cannot_sign() {
    let key = owner_key();
    let store = seeded_store(&key, &[10_000]);
    let sender = owner_address(&key);
    let intent = build_transfer(
        &store,
        NetworkId::Testnet,
        &sender,
        &recipient_address(),
        10_000,
        &NIGHT_TOKEN,
        Some(5_000),
    )
    .await
    .unwrap();

    let seed = mnemonic::phrase_to_seed(PHRASE, "other").unwrap();
    let wrong = hd::derive_key(&seed, 0, hd::Role::NightExternal, 0).unwrap();
    assert!(matches!(
        sign_intent(&intent, &wrong),
        Err(WalletError::Signing(_))
    ));
}

#[tokio::test]
async fn two_pass_fee_converges() {
    let key = owner_key();
    let store = seeded_store(&key, &[1_500_000]);
    let sender = owner_address(&key);
    let intent = build_transfer(
        &store,
        NetworkId::Testnet,
        &sender,
        &recipient_address(),
        1_000_000,
        &NIGHT_TOKEN,
        Some(2_000_000),
    )
    .await
    .unwrap();
    let signed = sign_intent(&intent, &key).unwrap();

    // Caps: 5_000 and 10_000 Specks across two dust coins.
    let mut dust = seeded_dust(&[1_000, 2_000]);
    let now = 1_000_000;
    let first_pass = encode_intent(&signed).unwrap();
    let expected_fee = kuira_planner::fee_for_size(first_pass.len(), 10);

    let (encoded, actions) = attach_fee(&signed, &mut dust, &DUST_SEED, 10, now).unwrap();
    assert_eq!(actions.total_fee(), expected_fee);
    assert!(!actions.spends.is_empty());
    assert!(encoded.len() > first_pass.len());

    // The dust state reflects the pending fee payment.
    let remaining: u128 = dust.balance(now);
    assert_eq!(remaining, 15_000 - expected_fee);
    dust.close();
}

#[tokio::test]
async fn zero_rate_attaches_no_dust() {
    let key = owner_key();
    let store = seeded_store(&key, &[10_000]);
    let sender = owner_address(&key);
    let intent = build_transfer(
        &store,
        NetworkId::Testnet,
        &sender,
        &recipient_address(),
        10_000,
        &NIGHT_TOKEN,
        Some(2_000_000),
    )
    .await
    .unwrap();
    let signed = sign_intent(&intent, &key).unwrap();

    let mut dust = seeded_dust(&[1_000]);
    let (encoded, actions) = attach_fee(&signed, &mut dust, &DUST_SEED, 0, 1_000).unwrap();
    assert!(actions.spends.is_empty());
    assert_eq!(encoded, encode_intent(&signed).unwrap());
}

// --- Submitter -------------------------------------------------------------

struct ScriptedNode {
    response: Mutex<Option<Result<[u8; 32]>>>,
}

impl ScriptedNode {
    fn ok(hash: [u8; 32]) -> Arc<Self> {
        Arc::new(Self { response: Mutex::new(Some(Ok(hash))) })
    }

    fn err(err: WalletError) -> Arc<Self> {
        Arc::new(Self { response: Mutex::new(Some(Err(err))) })
    }
}

#[async_trait]
impl NodeClient for ScriptedNode {
    async fn submit_extrinsic(&self, _extrinsic: &[u8]) -> Result<[u8; 32]> {
        self.response
            .lock()
            .unwrap()
            .take()
            .expect("node called once")
    }
}

struct ScriptedIndexer {
    updates: Vec<WalletSyncUpdate>,
    /// When set, the stream never yields; the submitter must time out.
    silent: bool,
}

#[async_trait]
impl IndexerClient for ScriptedIndexer {
    async fn subscribe_unshielded(
        &self,
        _address: &str,
        _from_tx_id: Option<u64>,
    ) -> Result<BoxStream<'static, Result<WalletSyncUpdate>>> {
        if self.silent {
            return Ok(futures::stream::pending().boxed());
        }
        let updates: Vec<Result<WalletSyncUpdate>> =
            self.updates.clone().into_iter().map(Ok).collect();
        Ok(futures::stream::iter(updates).chain(futures::stream::pending()).boxed())
    }

    async fn query_dust_events(&self, _address: &str, _up_to_block: Option<u64>) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

fn confirmation(tx_hash: [u8; 32], status: TransactionStatus) -> WalletSyncUpdate {
    WalletSyncUpdate::Transaction(TransactionUpdate {
        tx_id: 10,
        tx_hash,
        status,
        block_height: Some(4_242),
        block_time_ms: 99_000,
        created_utxos: vec![IndexerUtxo {
            intent_hash: [0xccu8; 32],
            output_index: 1,
            owner: "mn_addr_testnet1whoever".into(),
            value: 500_000,
            token_type: NIGHT_TOKEN,
        }],
        spent_utxos: vec![],
    })
}

fn test_config() -> NetworkConfig {
    let mut config = NetworkConfig::new(NetworkId::Testnet, "http://node", "http://indexer");
    config.confirmation_timeout_ms = 200;
    config
}

async fn reserved_fixture() -> (UtxoStore, Vec<UtxoId>, String) {
    let key = owner_key();
    let store = seeded_store(&key, &[1_500_000]);
    let sender = owner_address(&key);
    let rows = store.select_and_lock(&sender, &NIGHT_TOKEN, 1_000_000).await.unwrap();
    let ids: Vec<UtxoId> = rows.iter().map(|r| r.id).collect();
    (store, ids, sender)
}

#[tokio::test]
async fn confirmed_submission_marks_inputs_spent() {
    let (store, ids, sender) = reserved_fixture().await;
    let tx_hash = [9u8; 32];
    let submitter = Submitter::new(
        ScriptedNode::ok(tx_hash),
        Arc::new(ScriptedIndexer {
            updates: vec![
                WalletSyncUpdate::Progress { highest_tx_id: 9 },
                confirmation(tx_hash, TransactionStatus::Success),
            ],
            silent: false,
        }),
        store.clone(),
        test_config(),
    );

    let result = submitter.submit_and_wait(b"encoded", &ids, &sender).await.unwrap();
    assert_eq!(
        result,
        SubmissionResult::Success { tx_hash, block_height: Some(4_242) }
    );
    assert_eq!(store.get(&ids[0]).unwrap().unwrap().state, UtxoState::Spent);
}

#[tokio::test]
async fn partial_success_counts_as_confirmed() {
    let (store, ids, sender) = reserved_fixture().await;
    let tx_hash = [9u8; 32];
    let submitter = Submitter::new(
        ScriptedNode::ok(tx_hash),
        Arc::new(ScriptedIndexer {
            updates: vec![confirmation(tx_hash, TransactionStatus::PartialSuccess)],
            silent: false,
        }),
        store.clone(),
        test_config(),
    );

    let result = submitter.submit_and_wait(b"encoded", &ids, &sender).await.unwrap();
    assert!(matches!(result, SubmissionResult::Success { .. }));
}

#[tokio::test]
async fn in_block_failure_releases_reservations() {
    let (store, ids, sender) = reserved_fixture().await;
    let tx_hash = [9u8; 32];
    let submitter = Submitter::new(
        ScriptedNode::ok(tx_hash),
        Arc::new(ScriptedIndexer {
            updates: vec![confirmation(tx_hash, TransactionStatus::Failure)],
            silent: false,
        }),
        store.clone(),
        test_config(),
    );

    let result = submitter.submit_and_wait(b"encoded", &ids, &sender).await.unwrap();
    assert!(matches!(result, SubmissionResult::Failed { .. }));
    assert_eq!(store.get(&ids[0]).unwrap().unwrap().state, UtxoState::Available);
}

#[tokio::test]
async fn unmatched_hash_times_out_as_pending() {
    let (store, ids, sender) = reserved_fixture().await;
    let tx_hash = [9u8; 32];
    let submitter = Submitter::new(
        ScriptedNode::ok(tx_hash),
        Arc::new(ScriptedIndexer {
            // A different transaction confirms; ours never shows up.
            updates: vec![confirmation([1u8; 32], TransactionStatus::Success)],
            silent: false,
        }),
        store.clone(),
        test_config(),
    );

    let result = submitter.submit_and_wait(b"encoded", &ids, &sender).await.unwrap();
    assert_eq!(result, SubmissionResult::Pending { tx_hash });
    assert_eq!(store.get(&ids[0]).unwrap().unwrap().state, UtxoState::Pending);
}

#[tokio::test]
async fn silent_indexer_times_out_as_pending() {
    let (store, ids, sender) = reserved_fixture().await;
    let tx_hash = [9u8; 32];
    let submitter = Submitter::new(
        ScriptedNode::ok(tx_hash),
        Arc::new(ScriptedIndexer { updates: vec![], silent: true }),
        store.clone(),
        test_config(),
    );

    let result = submitter.submit_and_wait(b"encoded", &ids, &sender).await.unwrap();
    assert_eq!(result, SubmissionResult::Pending { tx_hash });
    assert_eq!(store.get(&ids[0]).unwrap().unwrap().state, UtxoState::Pending);
}

#[tokio::test]
async fn rpc_rejection_unlocks_and_surfaces() {
    let (store, ids, sender) = reserved_fixture().await;
    let submitter = Submitter::new(
        ScriptedNode::err(WalletError::NodeRpc { code: 1010, message: "bad proof".into() }),
        Arc::new(ScriptedIndexer { updates: vec![], silent: true }),
        store.clone(),
        test_config(),
    );

    let err = submitter.submit_and_wait(b"encoded", &ids, &sender).await.unwrap_err();
    assert!(matches!(err, WalletError::NodeRpc { code: 1010, .. }));
    assert_eq!(store.get(&ids[0]).unwrap().unwrap().state, UtxoState::Available);
}

#[tokio::test]
async fn transport_errors_keep_reservations() {
    let (store, ids, sender) = reserved_fixture().await;
    let submitter = Submitter::new(
        ScriptedNode::err(WalletError::NodeNetwork("connection reset".into())),
        Arc::new(ScriptedIndexer { updates: vec![], silent: true }),
        store.clone(),
        test_config(),
    );

    let err = submitter.submit_and_wait(b"encoded", &ids, &sender).await.unwrap_err();
    assert!(matches!(err, WalletError::NodeNetwork(_)));
    assert_eq!(store.get(&ids[0]).unwrap().unwrap().state, UtxoState::Pending);
}
