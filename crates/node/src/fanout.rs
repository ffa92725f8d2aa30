// Path: crates/node/src/fanout.rs

//! Client subscription fan-out.
//!
//! External clients (WebSocket handles behind the surface servers) register
//! interest in `(subnet, topic)` or `(subnet, entity type)` pairs. Every
//! finalized event is projected to JSON and pushed to the matching handles;
//! a handle whose push fails is dropped on the spot.

use mlayer_types::entities::{EntityModel, Event};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::sync::Arc;

/// A live client handle. `try_push` returns false when the client is gone.
pub trait ClientSink: Send + Sync {
    /// Pushes one JSON frame; false means the handle is dead.
    fn try_push(&self, payload: &serde_json::Value) -> bool;
}

/// Registry of client subscriptions keyed by `(subnet, key)` where `key` is
/// a topic id or an entity-type name.
#[derive(Default)]
pub struct FanoutRegistry {
    subs: RwLock<HashMap<(String, String), Vec<(u64, Arc<dyn ClientSink>)>>>,
    next_id: AtomicU64,
}

impl FanoutRegistry {
    /// Registers a handle; returns its subscription id.
    pub fn register(&self, subnet: &str, key: &str, sink: Arc<dyn ClientSink>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut subs) = self.subs.write() {
            subs.entry((subnet.to_string(), key.to_string()))
                .or_default()
                .push((id, sink));
        }
        id
    }

    /// Removes a subscription by id.
    pub fn unregister(&self, id: u64) {
        if let Ok(mut subs) = self.subs.write() {
            for handles in subs.values_mut() {
                handles.retain(|(sid, _)| *sid != id);
            }
        }
    }

    /// The JSON projection clients receive.
    fn projection(event: &Event, subscription_id: u64) -> serde_json::Value {
        json!({
            "subscriptionId": subscription_id,
            "event": {
                "id": event.id,
                "snet": event.subnet,
                "blk": event.block_number,
                "cy": event.cycle,
                "ep": event.epoch,
                "h": event.hash,
                "preE": event.previous_event,
                "authE": event.auth_event,
                "modelType": event.model().as_str(),
                "t": u16::from(event.event_type),
                "pld": serde_json::to_value(&event.payload).unwrap_or(serde_json::Value::Null),
            },
        })
    }

    fn push_to(&self, subnet: &str, key: &str, event: &Event) {
        let targets: Vec<(u64, Arc<dyn ClientSink>)> = match self.subs.read() {
            Ok(subs) => subs
                .get(&(subnet.to_string(), key.to_string()))
                .cloned()
                .unwrap_or_default(),
            Err(_) => return,
        };
        let mut dead = Vec::new();
        for (id, sink) in &targets {
            let frame = Self::projection(event, *id);
            if !sink.try_push(&frame) {
                dead.push(*id);
            }
        }
        if !dead.is_empty() {
            if let Ok(mut subs) = self.subs.write() {
                for handles in subs.values_mut() {
                    handles.retain(|(sid, _)| !dead.contains(sid));
                }
            }
        }
    }

    /// Pushes a finalized event to every matching subscription: the message
    /// topic pair when the event is a message, and always the entity-type
    /// pair.
    pub fn notify(&self, event: &Event, message_topic: Option<&str>) {
        if event.model() == EntityModel::Message {
            if let Some(topic) = message_topic {
                self.push_to(&event.subnet, topic, event);
            }
        }
        self.push_to(&event.subnet, event.model().as_str(), event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlayer_types::entities::{ClientPayload, EventKind, PayloadData, SignatureData, Subnet};
    use std::sync::Mutex;

    struct RecordingSink {
        frames: Mutex<Vec<serde_json::Value>>,
        alive: bool,
    }

    impl ClientSink for RecordingSink {
        fn try_push(&self, payload: &serde_json::Value) -> bool {
            if self.alive {
                self.frames.lock().unwrap().push(payload.clone());
            }
            self.alive
        }
    }

    fn subnet_event() -> Event {
        Event {
            auth_event: None,
            block_number: 5,
            broadcasted: true,
            cycle: 2,
            epoch: 1,
            error: String::new(),
            hash: "aa".into(),
            id: "e1".into(),
            is_valid: Some(true),
            payload_hash: String::new(),
            payload: ClientPayload {
                account: "did:0xab".into(),
                agent: String::new(),
                data: PayloadData::Subnet(Subnet::default()),
                signature: SignatureData::default(),
                subnet: String::new(),
                timestamp: 1000,
                event_type: EventKind::Create,
                validator: String::new(),
            },
            previous_event: None,
            signature: String::new(),
            subnet: "s1".into(),
            synced: Some(true),
            event_type: EventKind::Create,
            timestamp: 1000,
            validator: "v1".into(),
        }
    }

    #[test]
    fn pushes_projection_to_model_subscribers() {
        let registry = FanoutRegistry::default();
        let sink = Arc::new(RecordingSink {
            frames: Mutex::new(Vec::new()),
            alive: true,
        });
        registry.register("s1", "subnet", sink.clone());
        registry.notify(&subnet_event(), None);

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        let event = &frames[0]["event"];
        assert_eq!(event["id"], "e1");
        assert_eq!(event["snet"], "s1");
        assert_eq!(event["modelType"], "subnet");
        assert_eq!(event["cy"], 2);
    }

    #[test]
    fn dead_handles_are_removed_lazily() {
        let registry = FanoutRegistry::default();
        let dead = Arc::new(RecordingSink {
            frames: Mutex::new(Vec::new()),
            alive: false,
        });
        let live = Arc::new(RecordingSink {
            frames: Mutex::new(Vec::new()),
            alive: true,
        });
        registry.register("s1", "subnet", dead);
        registry.register("s1", "subnet", live.clone());

        registry.notify(&subnet_event(), None);
        registry.notify(&subnet_event(), None);

        // The live handle saw both pushes; the dead one was dropped after
        // its first failure.
        assert_eq!(live.frames.lock().unwrap().len(), 2);
        let subs = registry.subs.read().unwrap();
        assert_eq!(subs[&("s1".to_string(), "subnet".to_string())].len(), 1);
    }

    #[test]
    fn other_subnets_are_not_notified() {
        let registry = FanoutRegistry::default();
        let sink = Arc::new(RecordingSink {
            frames: Mutex::new(Vec::new()),
            alive: true,
        });
        registry.register("other", "subnet", sink.clone());
        registry.notify(&subnet_event(), None);
        assert!(sink.frames.lock().unwrap().is_empty());
    }
}
