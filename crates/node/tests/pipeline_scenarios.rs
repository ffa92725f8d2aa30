// Path: crates/node/tests/pipeline_scenarios.rs

//! End-to-end pipeline scenarios against a synthetic node context: temp-dir
//! stores, a pre-seeded chain cache and channel-drained networking.

use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex};

use mlayer_crypto::hash::eth_personal_digest;
use mlayer_crypto::sign::ed25519::Ed25519KeyPair;
use mlayer_crypto::sign::secp::SecpKeyPair;
use mlayer_node::context::NodeContext;
use mlayer_node::fanout::FanoutRegistry;
use mlayer_node::ingress::{IngressEvent, IngressSender, Origin};
use mlayer_node::oracle::{ChainCache, ChainInfo, ValidatorOperator};
use mlayer_node::pipeline::{process_event, PipelineOutcome};
use mlayer_node::stats;
use mlayer_node::sync::SyncJob;
use mlayer_node::validate;
use mlayer_networking::libp2p::SwarmCommand;
use mlayer_storage::{StoreName, Stores};
use mlayer_types::codec;
use mlayer_types::config::NodeConfig;
use mlayer_types::entities::{
    Authorization, ClientPayload, EntityData, EntityModel, Event, EventKind, EventPath, Message,
    PayloadData, Privilege, SignatureData, SignatureType, Subnet, Topic,
};
use mlayer_types::keys;

struct Harness {
    ctx: Arc<NodeContext>,
    _dir: TempDir,
    _swarm_rx: mpsc::Receiver<SwarmCommand>,
    counter_rx: mpsc::Receiver<Box<Event>>,
    sync_rx: mpsc::Receiver<SyncJob>,
    ingress_rx: mpsc::Receiver<IngressEvent>,
    account: SecpKeyPair,
    owner_address: String,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let stores = Stores::open(dir.path().join("node.redb")).unwrap();
        let keypair = Ed25519KeyPair::generate();
        let account = SecpKeyPair::generate();
        let license = SecpKeyPair::generate();
        let owner_address = license.address();

        let chain = Arc::new(ChainCache::new());
        chain.insert_validator(&ValidatorOperator {
            public_key_secp: license.public_key_hex(),
            edd_key: keypair.public_key_hex(),
            license_owner: owner_address.clone(),
        });
        chain.set_info(ChainInfo {
            current_block: 900,
            current_cycle: 7,
            current_epoch: 2,
            validator_active_license_count: 1,
            ..Default::default()
        });
        chain.mark_synced();

        let (swarm_tx, swarm_rx) = mpsc::channel(1024);
        let (counter_tx, counter_rx) = mpsc::channel(1024);
        let (sync_tx, sync_rx) = mpsc::channel(256);
        let (ingress_tx, ingress_rx) = mpsc::channel(1024);

        let config = NodeConfig {
            chain_id: "mlayer-1".into(),
            data_dir: dir.path().to_path_buf(),
            validator: true,
            test_mode: true,
            ..Default::default()
        };

        let ctx = Arc::new(NodeContext {
            config: Arc::new(config),
            stores,
            chain,
            keypair,
            swarm: swarm_tx,
            counters: counter_tx,
            fanout: Arc::new(FanoutRegistry::default()),
            ingress: IngressSender::new(ingress_tx),
            sync_jobs: sync_tx,
            connected_peers: Arc::new(Mutex::new(HashSet::new())),
        });

        Self {
            ctx,
            _dir: dir,
            _swarm_rx: swarm_rx,
            counter_rx,
            sync_rx,
            ingress_rx,
            account,
            owner_address,
        }
    }

    fn account_did(&self) -> String {
        format!("did:{}", self.account.address())
    }

    fn sign_payload_with(
        &self,
        signer: &SecpKeyPair,
        payload: &mut ClientPayload,
        action: &str,
        identifier: &str,
    ) {
        let message = validate::signature_message(&self.ctx, action, identifier, payload).unwrap();
        let digest = eth_personal_digest(message.as_bytes());
        let signature = signer.sign_prehash(&digest).unwrap();
        payload.signature = SignatureData {
            public_key: String::new(),
            signature: hex::encode(signature),
            sig_type: SignatureType::EthereumSecp,
        };
    }

    fn sign_payload(&self, payload: &mut ClientPayload, action: &str, identifier: &str) {
        let signer = self.account.clone();
        self.sign_payload_with(&signer, payload, action, identifier);
    }

    /// Builds a sealed, validator-signed event around a payload.
    fn make_event(
        &self,
        payload: ClientPayload,
        timestamp: u64,
        previous: Option<EventPath>,
    ) -> Event {
        let mut event = Event {
            auth_event: None,
            block_number: self.ctx.chain.current_block(),
            broadcasted: false,
            cycle: self.ctx.chain.current_cycle(),
            epoch: self.ctx.chain.current_epoch(),
            error: String::new(),
            hash: String::new(),
            id: String::new(),
            is_valid: None,
            payload_hash: payload.hash().unwrap(),
            event_type: payload.event_type,
            payload,
            previous_event: previous,
            signature: String::new(),
            subnet: String::new(),
            synced: None,
            timestamp,
            validator: self.ctx.public_key_hex(),
        };
        event.seal().unwrap();
        let signing = event.signing_bytes().unwrap();
        event.signature = self.ctx.keypair.sign_hex(&signing);
        event
    }

    fn subnet_payload(&self, reference: &str, id: &str, agent: &str, timestamp: u64) -> ClientPayload {
        let subnet = Subnet {
            account: self.account_did(),
            agent: agent.to_string(),
            id: id.to_string(),
            reference: reference.to_string(),
            status: 1,
            ..Default::default()
        };
        let mut payload = ClientPayload {
            account: self.account_did(),
            agent: agent.to_string(),
            data: PayloadData::Subnet(subnet),
            signature: SignatureData::default(),
            subnet: String::new(),
            timestamp,
            event_type: if id.is_empty() {
                EventKind::Create
            } else {
                EventKind::Update
            },
            validator: self.owner_address.clone(),
        };
        if agent.is_empty() {
            self.sign_payload(&mut payload, "write_subnet", reference);
        }
        payload
    }

    fn topic_payload(&self, subnet_id: &str, handle: &str, timestamp: u64, invite_only: bool) -> ClientPayload {
        let topic = Topic {
            handle: handle.to_string(),
            invite_only,
            owner: self.account_did(),
            subnet: subnet_id.to_string(),
            ..Default::default()
        };
        let mut payload = ClientPayload {
            account: self.account_did(),
            agent: String::new(),
            data: PayloadData::Topic(topic),
            signature: SignatureData::default(),
            subnet: subnet_id.to_string(),
            timestamp,
            event_type: EventKind::Create,
            validator: self.owner_address.clone(),
        };
        self.sign_payload(&mut payload, "write_topic", handle);
        payload
    }

    fn message_payload(
        &self,
        subnet_id: &str,
        topic_id: &str,
        body_hash: &str,
        timestamp: u64,
    ) -> ClientPayload {
        let message = Message {
            data_hash: body_hash.to_string(),
            sender: self.account_did(),
            subnet: subnet_id.to_string(),
            topic: topic_id.to_string(),
            ..Default::default()
        };
        let mut payload = ClientPayload {
            account: self.account_did(),
            agent: String::new(),
            data: PayloadData::Message(message),
            signature: SignatureData::default(),
            subnet: subnet_id.to_string(),
            timestamp,
            event_type: EventKind::Create,
            validator: self.owner_address.clone(),
        };
        self.sign_payload(&mut payload, "send_message", topic_id);
        payload
    }

    async fn process(&self, event: Event, origin: Origin) -> PipelineOutcome {
        process_event(&self.ctx, event, origin).await.unwrap()
    }

    fn stored_event(&self, id: &str) -> Option<Event> {
        self.ctx
            .stores
            .get(StoreName::Events, &keys::event_key(id))
            .unwrap()
            .map(|bytes| codec::from_bytes_canonical(&bytes).unwrap())
    }

    fn current_subnet(&self, id: &str) -> Option<Subnet> {
        self.ctx
            .stores
            .get(
                StoreName::CurrentState,
                &keys::current_state_key(EntityModel::Subnet, id),
            )
            .unwrap()
            .map(|bytes| codec::from_bytes_canonical(&bytes).unwrap())
    }

    fn current_topic(&self, id: &str) -> Option<Topic> {
        self.ctx
            .stores
            .get(
                StoreName::CurrentState,
                &keys::current_state_key(EntityModel::Topic, id),
            )
            .unwrap()
            .map(|bytes| codec::from_bytes_canonical(&bytes).unwrap())
    }

    fn historic_exists(&self, model: EntityModel, id: &str, event_id: &str) -> bool {
        self.ctx
            .stores
            .has(
                StoreName::HistoricState,
                &keys::historic_state_key(model, id, event_id),
            )
            .unwrap()
    }

    /// Pops one requeued dependent off the held ingress channel.
    fn take_requeued(&mut self) -> Option<IngressEvent> {
        self.ingress_rx.try_recv().ok()
    }

    /// Creates a subnet through the pipeline and returns its entity id.
    async fn seed_subnet(&self, reference: &str, timestamp: u64) -> String {
        let payload = self.subnet_payload(reference, "", "", timestamp);
        let id = payload.data.entity_id().unwrap();
        let event = self.make_event(payload, timestamp, None);
        assert_eq!(
            self.process(event, Origin::Peer).await,
            PipelineOutcome::Applied { won: true }
        );
        id
    }
}

// --- Scenario 1: create subnet, then update, delivered out of order ---

#[tokio::test]
async fn create_then_update_out_of_order_converges_on_the_update() {
    let mut h = Harness::new();

    let create = h.subnet_payload("acme.chat", "", "", 1000);
    let s1 = create.data.entity_id().unwrap();
    let event_a = h.make_event(create, 1000, None);

    let update = h.subnet_payload("acme.mail", &s1, "", 1001);
    let event_b = h.make_event(update, 1001, Some(event_a.path()));

    // B first: its previous event is unknown, so it parks and asks sync.
    assert_eq!(
        h.process(event_b.clone(), Origin::Peer).await,
        PipelineOutcome::Deferred
    );
    let parked = h.stored_event(&event_b.id).unwrap();
    assert_eq!(parked.synced, Some(false));
    match h.sync_rx.try_recv().unwrap() {
        SyncJob::Event(path) => assert_eq!(path.id, event_a.id),
        other => panic!("expected an event sync job, got {other:?}"),
    }

    // A lands and wakes B up.
    assert_eq!(
        h.process(event_a.clone(), Origin::Peer).await,
        PipelineOutcome::Applied { won: true }
    );
    let requeued = h.take_requeued().expect("dependent event requeued");
    assert_eq!(requeued.event.id, event_b.id);
    assert_eq!(
        h.process(*requeued.event, requeued.origin).await,
        PipelineOutcome::Applied { won: true }
    );

    // Final state: B wins, A is history, both events are valid and synced.
    let current = h.current_subnet(&s1).unwrap();
    assert_eq!(current.reference, "acme.mail");
    assert_eq!(current.event.as_ref().unwrap().id, event_b.id);
    assert!(h.historic_exists(EntityModel::Subnet, &s1, &event_a.id));
    for id in [&event_a.id, &event_b.id] {
        let stored = h.stored_event(id).unwrap();
        assert_eq!(stored.is_valid, Some(true));
        assert_eq!(stored.synced, Some(true));
    }

    // Current-state coherence: the stored hash recomputes from the row.
    let mut unstamped = current.clone();
    let row_hash = std::mem::take(&mut unstamped.hash);
    assert_eq!(unstamped.canonical_hash().unwrap(), row_hash);
}

// --- Scenario 2: concurrent creates tie-break on the event hash ---

#[tokio::test]
async fn equal_timestamp_creates_resolve_by_hash() {
    let h = Harness::new();
    let subnet_id = h.seed_subnet("acme.chat", 500).await;

    let topic_a = h.make_event(h.topic_payload(&subnet_id, "general", 1000, false), 1000, None);
    let topic_b = h.make_event(h.topic_payload(&subnet_id, "general", 1000, true), 1000, None);
    let t1 = topic_a.payload.data.entity_id().unwrap();
    assert_eq!(t1, topic_b.payload.data.entity_id().unwrap());

    let (winner, loser) = if hex::decode(&topic_a.hash).unwrap() > hex::decode(&topic_b.hash).unwrap()
    {
        (&topic_a, &topic_b)
    } else {
        (&topic_b, &topic_a)
    };

    // Deliver loser-first so the winner has to displace it.
    assert_eq!(
        h.process(loser.clone(), Origin::Peer).await,
        PipelineOutcome::Applied { won: true }
    );
    assert_eq!(
        h.process(winner.clone(), Origin::Peer).await,
        PipelineOutcome::Applied { won: true }
    );

    let current = h.current_topic(&t1).unwrap();
    assert_eq!(current.event.as_ref().unwrap().id, winner.id);
    assert!(h.historic_exists(EntityModel::Topic, &t1, &loser.id));
}

#[tokio::test]
async fn convergence_is_order_independent() {
    let run = |first_wins: bool| async move {
        let h = Harness::new();
        let subnet_id = h.seed_subnet("acme.chat", 500).await;
        let a = h.make_event(h.topic_payload(&subnet_id, "general", 1000, false), 1000, None);
        let b = h.make_event(h.topic_payload(&subnet_id, "general", 1000, true), 1000, None);
        let t1 = a.payload.data.entity_id().unwrap();
        if first_wins {
            h.process(a.clone(), Origin::Peer).await;
            h.process(b.clone(), Origin::Peer).await;
        } else {
            h.process(b.clone(), Origin::Peer).await;
            h.process(a.clone(), Origin::Peer).await;
        }
        let current = h.current_topic(&t1).unwrap();
        (current.event.unwrap().id, current.invite_only)
    };

    let forward = run(true).await;
    let backward = run(false).await;
    assert_eq!(forward, backward);
}

// --- Scenario 3: dependency miss, sync, recovery ---

#[tokio::test]
async fn dependency_miss_defers_then_recovers() {
    let mut h = Harness::new();

    let create = h.subnet_payload("acme.chat", "", "", 1000);
    let s1 = create.data.entity_id().unwrap();
    let event_d = h.make_event(create, 1000, None);

    let update = h.subnet_payload("acme.store", &s1, "", 2000);
    let event_c = h.make_event(update, 2000, Some(event_d.path()));

    assert_eq!(
        h.process(event_c.clone(), Origin::Peer).await,
        PipelineOutcome::Deferred
    );
    assert_eq!(h.stored_event(&event_c.id).unwrap().synced, Some(false));
    assert!(matches!(h.sync_rx.try_recv(), Ok(SyncJob::Event(p)) if p.id == event_d.id));
    assert!(h.current_subnet(&s1).is_none());

    // D arrives (as sync would deliver it), applies, and C re-runs clean.
    assert_eq!(
        h.process(event_d, Origin::Sync).await,
        PipelineOutcome::Applied { won: true }
    );
    let requeued = h.take_requeued().unwrap();
    assert_eq!(
        h.process(*requeued.event, requeued.origin).await,
        PipelineOutcome::Applied { won: true }
    );
    assert_eq!(h.current_subnet(&s1).unwrap().reference, "acme.store");
    assert_eq!(h.stored_event(&event_c.id).unwrap().synced, Some(true));
}

#[tokio::test]
async fn missing_state_defers_and_wakes_when_the_state_arrives() {
    let mut h = Harness::new();

    // A topic for a subnet we have never seen parks and asks for the state.
    let create = h.subnet_payload("acme.chat", "", "", 1000);
    let subnet_id = create.data.entity_id().unwrap();
    let subnet_event = h.make_event(create, 1000, None);

    let topic = h.make_event(h.topic_payload(&subnet_id, "general", 2000, false), 2000, None);
    assert_eq!(
        h.process(topic.clone(), Origin::Peer).await,
        PipelineOutcome::Deferred
    );
    assert!(matches!(
        h.sync_rx.try_recv(),
        Ok(SyncJob::State { model: EntityModel::Subnet, id }) if id == subnet_id
    ));

    // The subnet arrives; the parked topic is requeued and applies.
    assert_eq!(
        h.process(subnet_event, Origin::Sync).await,
        PipelineOutcome::Applied { won: true }
    );
    let requeued = h.take_requeued().unwrap();
    assert_eq!(requeued.event.id, topic.id);
    assert_eq!(
        h.process(*requeued.event, requeued.origin).await,
        PipelineOutcome::Applied { won: true }
    );
}

// --- Scenario 4: tampered signature ---

#[tokio::test]
async fn tampered_signature_is_dropped_without_persistence() {
    let h = Harness::new();
    let payload = h.subnet_payload("acme.chat", "", "", 1000);
    let mut event = h.make_event(payload, 1000, None);
    // Flip one signature byte.
    let mut sig = hex::decode(&event.signature).unwrap();
    sig[10] ^= 0xff;
    event.signature = hex::encode(sig);

    assert_eq!(
        h.process(event.clone(), Origin::Peer).await,
        PipelineOutcome::Dropped("invalid-signature")
    );
    assert!(h.stored_event(&event.id).is_none());
    assert_eq!(
        h.ctx
            .stores
            .get_counter(StoreName::NetworkStats, keys::INVALID_SIGNATURE_KEY)
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn unknown_validator_is_dropped() {
    let h = Harness::new();
    let payload = h.subnet_payload("acme.chat", "", "", 1000);
    let mut event = h.make_event(payload, 1000, None);
    // Re-sign with a keypair that holds no license.
    let rogue = Ed25519KeyPair::generate();
    event.validator = rogue.public_key_hex();
    event.seal().unwrap();
    let signing = event.signing_bytes().unwrap();
    event.signature = rogue.sign_hex(&signing);

    assert_eq!(
        h.process(event.clone(), Origin::Peer).await,
        PipelineOutcome::Dropped("invalid-validator")
    );
    assert!(h.stored_event(&event.id).is_none());
    assert_eq!(
        h.ctx
            .stores
            .get_counter(StoreName::NetworkStats, keys::INVALID_VALIDATOR_KEY)
            .unwrap(),
        1
    );
}

// --- Scenario 5: agent with insufficient privilege ---

#[tokio::test]
async fn under_privileged_agent_is_persisted_invalid() {
    let h = Harness::new();
    let s1 = h.seed_subnet("acme.chat", 500).await;

    // Grant the agent read only.
    let agent = SecpKeyPair::generate();
    let agent_did = format!("did:{}", agent.address());
    let grant = Authorization {
        account: h.account_did(),
        agent: agent_did.clone(),
        privilege: Privilege::Read,
        subnet: s1.clone(),
        ..Default::default()
    };
    let grant_id = grant.derive_id().unwrap();
    h.ctx
        .stores
        .put(
            StoreName::CurrentState,
            &keys::current_state_key(EntityModel::Authorization, &grant_id),
            codec::to_bytes_canonical(&grant).unwrap(),
        )
        .unwrap();

    // The agent tries to update the subnet.
    let mut payload = h.subnet_payload("acme.mail", &s1, &agent_did, 2000);
    h.sign_payload_with(&agent, &mut payload, "write_subnet", "acme.mail");
    let before = h.current_subnet(&s1).unwrap();
    let event = h.make_event(payload, 2000, before.event.clone());

    assert_eq!(
        h.process(event.clone(), Origin::Peer).await,
        PipelineOutcome::Rejected
    );

    let stored = h.stored_event(&event.id).unwrap();
    assert_eq!(stored.is_valid, Some(false));
    assert!(stored.error.starts_with("4003"), "error was {}", stored.error);
    // No state change, and the current row still points at a valid event.
    let after = h.current_subnet(&s1).unwrap();
    assert_eq!(after.reference, before.reference);
    let winning = h.stored_event(&after.event.unwrap().id).unwrap();
    assert_eq!(winning.is_valid, Some(true));
}

// --- Scenario 6: stats accrual ---

#[tokio::test]
async fn stats_accrue_across_cycles_subnets_and_validators() {
    let mut h = Harness::new();

    let mut topics = Vec::new();
    for (i, reference) in ["acme.one", "acme.two", "acme.three"].iter().enumerate() {
        let subnet_id = h.seed_subnet(reference, 100 + i as u64).await;
        let topic_payload = h.topic_payload(&subnet_id, "general", 200 + i as u64, false);
        let topic_id = topic_payload.data.entity_id().unwrap();
        let event = h.make_event(topic_payload, 200 + i as u64, None);
        assert_eq!(
            h.process(event, Origin::Peer).await,
            PipelineOutcome::Applied { won: true }
        );
        topics.push((subnet_id, topic_id));
    }

    // Setup events are not part of the measurement.
    while h.counter_rx.try_recv().is_ok() {}

    let mut last_event_id = String::new();
    for i in 0..100u64 {
        let (subnet_id, topic_id) = &topics[(i % 3) as usize];
        let payload =
            h.message_payload(subnet_id, topic_id, &format!("{i:064x}"), 10_000 + i);
        let event = h.make_event(payload, 10_000 + i, None);
        last_event_id = event.id.clone();
        assert_eq!(
            h.process(event, Origin::Peer).await,
            PipelineOutcome::Applied { won: true }
        );
    }

    stats::drain_and_flush(&h.ctx.stores, &mut h.counter_rx);

    let stores = &h.ctx.stores;
    assert_eq!(stats::network_total(stores), 100);

    let per_subnet: u64 = topics
        .iter()
        .map(|(subnet_id, _)| {
            stores
                .get_counter(
                    StoreName::NetworkStats,
                    &keys::network_counter_key(Some(subnet_id)),
                )
                .unwrap()
        })
        .sum();
    assert_eq!(per_subnet, 100);

    let validator = h.ctx.public_key_hex();
    assert_eq!(
        stores
            .get_counter(
                StoreName::NetworkStats,
                &keys::cycle_counter_key(7, Some(&validator), None),
            )
            .unwrap(),
        100
    );
    assert_eq!(
        stores
            .get(StoreName::NetworkStats, &keys::recent_event_key(7))
            .unwrap(),
        Some(last_event_id.into_bytes())
    );
}

// --- Boundaries and idempotency ---

#[tokio::test]
async fn subnet_ref_boundary_is_exactly_64() {
    let h = Harness::new();

    let ok = h.subnet_payload(&"a".repeat(64), "", "", 1000);
    let event = h.make_event(ok, 1000, None);
    assert_eq!(
        h.process(event, Origin::Peer).await,
        PipelineOutcome::Applied { won: true }
    );

    let too_long = h.subnet_payload(&"a".repeat(65), "", "", 1001);
    let event = h.make_event(too_long, 1001, None);
    let id = event.id.clone();
    assert_eq!(h.process(event, Origin::Peer).await, PipelineOutcome::Rejected);
    let stored = h.stored_event(&id).unwrap();
    assert_eq!(stored.is_valid, Some(false));
    assert!(stored.error.starts_with("4000"), "error was {}", stored.error);
}

#[tokio::test]
async fn redelivery_of_an_applied_event_changes_nothing() {
    let h = Harness::new();
    let payload = h.subnet_payload("acme.chat", "", "", 1000);
    let s1 = payload.data.entity_id().unwrap();
    let event = h.make_event(payload, 1000, None);

    assert_eq!(
        h.process(event.clone(), Origin::Peer).await,
        PipelineOutcome::Applied { won: true }
    );
    let state_before = h
        .ctx
        .stores
        .get(
            StoreName::CurrentState,
            &keys::current_state_key(EntityModel::Subnet, &s1),
        )
        .unwrap();

    assert_eq!(
        h.process(event, Origin::Peer).await,
        PipelineOutcome::Duplicate
    );
    let state_after = h
        .ctx
        .stores
        .get(
            StoreName::CurrentState,
            &keys::current_state_key(EntityModel::Subnet, &s1),
        )
        .unwrap();
    assert_eq!(state_before, state_after);
}

#[tokio::test]
async fn local_payload_failures_abort_before_persistence() {
    let h = Harness::new();
    let payload = h.subnet_payload(&"b".repeat(65), "", "", 1000);
    let event = h.make_event(payload, 1000, None);
    let id = event.id.clone();
    let result = process_event(&h.ctx, event, Origin::Local).await;
    assert!(result.is_err());
    assert!(h.stored_event(&id).is_none());
}
