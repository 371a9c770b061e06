//! In-memory cluster harness for end-to-end consensus tests.
//!
//! Every node runs a real engine over a [`TestHost`] double and a
//! [`ManualTimer`]. The test script owns the network: broadcasts pile up in
//! each host's outbox and are delivered (or dropped, delayed, partitioned)
//! explicitly, so adversarial schedules are just code.

#![allow(dead_code)]

use std::collections::HashMap;

use dbft_engine::{resolve_key_pair, Config, Dbft, Host, ManualTimer};
use dbft_payloads::{ConsensusPayload, Message, MessageType};
use dbft_types::{consensus_address, Block, Hash, KeyPair, PublicKey, Transaction};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const INTERVAL_MS: u64 = 15_000;
pub const BASE_TIME_MS: u64 = 1_700_000_000;

/// Host double: in-memory mempool, chain tip, and a captured outbox.
pub struct TestHost {
    pub key: Option<KeyPair>,
    pub validators: Vec<PublicKey>,
    pub mempool: HashMap<Hash, Transaction>,
    pub pool_order: Vec<Hash>,
    pub height: u32,
    pub block_hash: Hash,
    /// Undelivered broadcasts, drained by the cluster router.
    pub outbox: Vec<ConsensusPayload>,
    /// Every broadcast ever made, for determinism comparisons.
    pub broadcast_log: Vec<ConsensusPayload>,
    pub processed: Vec<Block>,
    pub requested: Vec<Hash>,
    pub watch_only: bool,
}

impl TestHost {
    pub fn new(key: Option<KeyPair>, validators: Vec<PublicKey>) -> Self {
        Self {
            key,
            validators,
            mempool: HashMap::new(),
            pool_order: Vec::new(),
            height: 0,
            block_hash: Hash::digest(b"genesis"),
            outbox: Vec::new(),
            broadcast_log: Vec::new(),
            processed: Vec::new(),
            requested: Vec::new(),
            watch_only: false,
        }
    }

    pub fn add_transaction(&mut self, tx: Transaction) {
        if self.mempool.insert(tx.hash(), tx.clone()).is_none() {
            self.pool_order.push(tx.hash());
        }
    }
}

impl Host for TestHost {
    fn key_pair(&self, validators: &[PublicKey]) -> Option<(u16, KeyPair)> {
        self.key
            .as_ref()
            .and_then(|key| resolve_key_pair(key, validators))
    }

    fn validators(&mut self, _height: u32) -> Vec<PublicKey> {
        self.validators.clone()
    }

    fn current_height(&self) -> u32 {
        self.height
    }

    fn current_block_hash(&self) -> Hash {
        self.block_hash
    }

    fn transaction(&mut self, hash: &Hash) -> Option<Transaction> {
        self.mempool.get(hash).cloned()
    }

    fn verified_transactions(&mut self) -> Vec<Transaction> {
        self.pool_order
            .iter()
            .filter_map(|hash| self.mempool.get(hash).cloned())
            .collect()
    }

    fn request_transactions(&mut self, hashes: &[Hash]) {
        self.requested.extend_from_slice(hashes);
    }

    fn broadcast(&mut self, payload: ConsensusPayload) {
        self.outbox.push(payload.clone());
        self.broadcast_log.push(payload);
    }

    fn process_block(&mut self, block: &Block) {
        self.height = block.header.index;
        self.block_hash = block.hash();
        for tx in &block.transactions {
            self.mempool.remove(&tx.hash());
            self.pool_order.retain(|hash| *hash != tx.hash());
        }
        self.processed.push(block.clone());
    }

    fn watch_only(&self) -> bool {
        self.watch_only
    }
}

pub struct Cluster {
    pub nodes: Vec<Dbft<TestHost>>,
    pub timers: Vec<ManualTimer>,
    pub keys: Vec<KeyPair>,
    pub validators: Vec<PublicKey>,
    /// Highest `(height, view)` observed per node, for monotonicity checks.
    view_watermarks: Vec<(u32, u8)>,
}

impl Cluster {
    /// Build `n` validators with deterministic keys and empty mempools.
    pub fn new(n: usize) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let keys: Vec<KeyPair> = (0..n)
            .map(|_| {
                let mut seed = [0u8; 32];
                rng.fill_bytes(&mut seed);
                KeyPair::from_seed(seed)
            })
            .collect();
        let validators: Vec<PublicKey> = keys.iter().map(KeyPair::public_key).collect();

        let mut nodes = Vec::with_capacity(n);
        let mut timers = Vec::with_capacity(n);
        for key in &keys {
            let timer = ManualTimer::new();
            timer.set_now(BASE_TIME_MS);
            let host = TestHost::new(Some(key.clone()), validators.clone());
            let config = Config {
                block_interval: std::time::Duration::from_millis(INTERVAL_MS),
                timestamp_increment: 1,
            };
            let node =
                Dbft::new(config, host, Box::new(timer.clone())).expect("valid test config");
            nodes.push(node);
            timers.push(timer);
        }

        Self {
            nodes,
            timers,
            keys,
            validators,
            view_watermarks: vec![(0, 0); n],
        }
    }

    /// Like [`Cluster::new`], with `txs` preloaded into every mempool.
    pub fn with_transactions(n: usize, txs: &[Transaction]) -> Self {
        let mut cluster = Self::new(n);
        for node in &mut cluster.nodes {
            for tx in txs {
                node.host_mut().add_transaction(tx.clone());
            }
        }
        cluster
    }

    pub fn start_all(&mut self) {
        for node in &mut self.nodes {
            node.start();
        }
    }

    /// Fire a node's pending timer as if its deadline elapsed.
    pub fn fire(&mut self, i: usize) {
        if let Some(hv) = self.timers[i].pop_pending() {
            self.nodes[i].on_timeout(hv);
            self.assert_view_monotonic(i);
        }
    }

    pub fn take_outbox(&mut self, i: usize) -> Vec<ConsensusPayload> {
        std::mem::take(&mut self.nodes[i].host_mut().outbox)
    }

    pub fn drop_outbox(&mut self, i: usize) {
        self.take_outbox(i);
    }

    pub fn deliver(&mut self, to: usize, payload: ConsensusPayload) {
        self.nodes[to].on_receive(payload);
        self.assert_view_monotonic(to);
        self.assert_coherence(to);
    }

    /// Views never go backwards at a fixed height.
    fn assert_view_monotonic(&mut self, i: usize) {
        let ctx = self.nodes[i].context();
        let current = (ctx.block_index, ctx.view_number);
        let previous = self.view_watermarks[i];
        assert!(
            current.0 > previous.0 || (current.0 == previous.0 && current.1 >= previous.1),
            "node {i} went backwards: {previous:?} -> {current:?}"
        );
        self.view_watermarks[i] = current;
    }

    /// Route every queued broadcast among `live` nodes until nothing moves.
    pub fn run_to_quiescence(&mut self, live: &[usize]) {
        loop {
            let mut moved = false;
            for &from in live {
                let batch = self.take_outbox(from);
                for payload in batch {
                    moved = true;
                    for &to in live {
                        if to != from {
                            self.deliver(to, payload.clone());
                        }
                    }
                }
            }
            if !moved {
                break;
            }
        }
    }

    /// Slot coherence: every stored payload sits in the slot of its sender,
    /// at the node's current height; preparations only ever hold the
    /// current view.
    pub fn assert_coherence(&self, i: usize) {
        let ctx = self.nodes[i].context();
        for (index, slot) in ctx.preparation_payloads.iter().enumerate() {
            if let Some(p) = slot {
                assert_eq!(p.validator_index as usize, index, "node {i} preparation slot");
                assert_eq!(p.height, ctx.block_index, "node {i} preparation height");
                assert_eq!(p.view, ctx.view_number, "node {i} preparation view");
            }
        }
        for (index, slot) in ctx.commit_payloads.iter().enumerate() {
            if let Some(p) = slot {
                assert_eq!(p.validator_index as usize, index, "node {i} commit slot");
                assert_eq!(p.height, ctx.block_index, "node {i} commit height");
            }
        }
        for (index, slot) in ctx.change_view_payloads.iter().enumerate() {
            if let Some(p) = slot {
                assert_eq!(p.validator_index as usize, index, "node {i} change view slot");
                assert_eq!(p.height, ctx.block_index, "node {i} change view height");
            }
        }
    }

    /// Hash of the single block node `i` finalized.
    pub fn finalized_hash(&self, i: usize) -> Hash {
        let processed = &self.nodes[i].host().processed;
        assert_eq!(processed.len(), 1, "node {i} should have one block");
        processed[0].hash()
    }

    /// All Commit broadcasts node `i` ever made, with their views.
    pub fn commit_views(&self, i: usize) -> Vec<u8> {
        self.nodes[i]
            .host()
            .broadcast_log
            .iter()
            .filter(|p| p.message_type() == MessageType::Commit)
            .map(|p| p.view)
            .collect()
    }

    pub fn change_view_count(&self, i: usize) -> usize {
        self.nodes[i]
            .host()
            .broadcast_log
            .iter()
            .filter(|p| p.message_type() == MessageType::ChangeView)
            .count()
    }
}

pub fn tx(data: &[u8]) -> Transaction {
    Transaction::new(data.to_vec())
}

/// Build a PrepareRequest payload as validator `from` would, for crafting
/// adversarial schedules.
pub fn craft_prepare_request(
    cluster: &Cluster,
    from: u16,
    height: u32,
    view: u8,
    txs: &[Transaction],
    timestamp: u64,
) -> ConsensusPayload {
    let request = dbft_payloads::PrepareRequest {
        timestamp,
        nonce: 7,
        next_consensus: consensus_address(&cluster.validators),
        transaction_hashes: txs.iter().map(Transaction::hash).collect(),
    };
    ConsensusPayload::new(from, height, view, Message::PrepareRequest(request))
}

pub fn craft_prepare_response(
    from: u16,
    height: u32,
    view: u8,
    preparation_hash: Hash,
) -> ConsensusPayload {
    ConsensusPayload::new(
        from,
        height,
        view,
        Message::PrepareResponse(dbft_payloads::PrepareResponse { preparation_hash }),
    )
}

pub fn craft_change_view(from: u16, height: u32, view: u8, new_view: u8) -> ConsensusPayload {
    ConsensusPayload::new(
        from,
        height,
        view,
        Message::ChangeView(dbft_payloads::ChangeView {
            new_view_number: new_view,
            timestamp: BASE_TIME_MS,
            reason: dbft_payloads::ChangeViewReason::Timeout,
        }),
    )
}

pub fn craft_recovery_request(from: u16, height: u32, view: u8) -> ConsensusPayload {
    ConsensusPayload::new(
        from,
        height,
        view,
        Message::RecoveryRequest(dbft_payloads::RecoveryRequest {
            timestamp: BASE_TIME_MS,
        }),
    )
}
