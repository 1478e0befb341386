//! In-memory transport for testing and single-process scenarios.
//!
//! Envelopes are encoded with the transport's serializer on `send` and
//! decoded on `get`, so serializer misconfiguration surfaces here the same
//! way it would with a real broker. Delay stamps are kept but not honoured.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ListableReceiver, Transport, TransportError};
use crate::envelope::{Envelope, Stamp};
use crate::serializer::{EncodedEnvelope, Serializer};

struct Entry {
    encoded: EncodedEnvelope,
    in_flight: bool,
    delivered_before: bool,
}

#[derive(Default)]
struct State {
    next_id: u64,
    entries: BTreeMap<u64, Entry>,
    sent: Vec<Envelope>,
    acked: Vec<Envelope>,
    rejected: Vec<Envelope>,
}

/// In-memory transport (`in-memory://`).
///
/// Features:
/// - Thread-safe (clones share the same storage)
/// - Hands out one envelope per `get()`, oldest first
/// - Keeps a record of sent, acknowledged and rejected envelopes
/// - Listable, so it can serve as a failure transport
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use messenger_bundle::envelope::Envelope;
/// use messenger_bundle::serializer::NativeSerializer;
/// use messenger_bundle::transport::{InMemoryTransport, Transport};
///
/// let transport = InMemoryTransport::new("async", Arc::new(NativeSerializer));
/// transport.send(Envelope::with_string_body("msg-1", "SendEmail", "{}")).unwrap();
///
/// let received = transport.get().unwrap();
/// assert_eq!(received[0].message_type, "SendEmail");
/// transport.ack(&received[0]).unwrap();
/// assert!(transport.is_empty());
/// ```
#[derive(Clone)]
pub struct InMemoryTransport {
    name: String,
    serializer: Arc<dyn Serializer>,
    state: Arc<Mutex<State>>,
}

impl InMemoryTransport {
    pub fn new(name: impl Into<String>, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            name: name.into(),
            serializer,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Envelopes passed to `send`, in order.
    pub fn sent(&self) -> Vec<Envelope> {
        self.lock("sent").map(|s| s.sent.clone()).unwrap_or_default()
    }

    /// Envelopes acknowledged so far.
    pub fn acknowledged(&self) -> Vec<Envelope> {
        self.lock("acknowledged").map(|s| s.acked.clone()).unwrap_or_default()
    }

    /// Envelopes rejected so far.
    pub fn rejected(&self) -> Vec<Envelope> {
        self.lock("rejected").map(|s| s.rejected.clone()).unwrap_or_default()
    }

    /// Number of stored envelopes, in flight or not.
    pub fn len(&self) -> usize {
        self.lock("len").map(|s| s.entries.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make in-flight envelopes available again, flagged as redelivered.
    ///
    /// Simulates a consumer that died before acknowledging.
    pub fn recover(&self) -> Result<usize, TransportError> {
        let mut state = self.lock("recover")?;
        let mut recovered = 0;
        for entry in state.entries.values_mut().filter(|e| e.in_flight) {
            entry.in_flight = false;
            entry.delivered_before = true;
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Clear all envelopes and records (useful for test cleanup).
    pub fn clear(&self) -> Result<(), TransportError> {
        *self.lock("clear")? = State::default();
        Ok(())
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, State>, TransportError> {
        self.state
            .lock()
            .map_err(|_| TransportError::LockPoisoned(operation))
    }

    fn decode(&self, id: u64, entry: &Entry) -> Result<Envelope, TransportError> {
        let envelope = self.serializer.decode(&entry.encoded)?;
        Ok(envelope.with(Stamp::TransportMessageId(id.to_string())))
    }

    fn remove(&self, envelope: &Envelope, operation: &'static str) -> Result<(), TransportError> {
        let id = parse_id(envelope)?;
        let mut state = self.lock(operation)?;
        if state.entries.remove(&id).is_none() {
            return Err(TransportError::NotFound(id.to_string()));
        }
        match operation {
            "ack" => state.acked.push(envelope.clone()),
            _ => state.rejected.push(envelope.clone()),
        }
        Ok(())
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, envelope: Envelope) -> Result<Envelope, TransportError> {
        let encoded = self.serializer.encode(&envelope)?;
        let mut state = self.lock("send")?;
        state.next_id += 1;
        let id = state.next_id;
        state.entries.insert(
            id,
            Entry {
                encoded,
                in_flight: false,
                delivered_before: false,
            },
        );
        let envelope = envelope.with(Stamp::TransportMessageId(id.to_string()));
        state.sent.push(envelope.clone());
        Ok(envelope)
    }

    fn get(&self) -> Result<Vec<Envelope>, TransportError> {
        let mut state = self.lock("get")?;
        let next = state
            .entries
            .iter_mut()
            .find(|(_, entry)| !entry.in_flight)
            .map(|(id, entry)| {
                entry.in_flight = true;
                *id
            });

        let Some(id) = next else {
            return Ok(Vec::new());
        };

        let decoded = match state.entries.get(&id) {
            Some(entry) => self.decode(id, entry).map(|envelope| {
                envelope.with(Stamp::Received {
                    transport: self.name.clone(),
                    redelivered: entry.delivered_before,
                })
            }),
            None => return Ok(Vec::new()),
        };

        match decoded {
            Ok(envelope) => Ok(vec![envelope]),
            Err(err) => {
                // An undecodable envelope would otherwise be handed out forever.
                state.entries.remove(&id);
                Err(err)
            }
        }
    }

    fn ack(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.remove(envelope, "ack")
    }

    fn reject(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.remove(envelope, "reject")
    }

    fn as_listable(&self) -> Option<&dyn ListableReceiver> {
        Some(self)
    }
}

impl ListableReceiver for InMemoryTransport {
    fn all(&self, limit: Option<usize>) -> Result<Vec<Envelope>, TransportError> {
        let state = self.lock("all")?;
        state
            .entries
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(id, entry)| self.decode(*id, entry))
            .collect()
    }

    fn find(&self, id: &str) -> Result<Option<Envelope>, TransportError> {
        let Ok(key) = id.parse::<u64>() else {
            return Ok(None);
        };
        let state = self.lock("find")?;
        state
            .entries
            .get(&key)
            .map(|entry| self.decode(key, entry))
            .transpose()
    }
}

fn parse_id(envelope: &Envelope) -> Result<u64, TransportError> {
    let id = envelope
        .transport_message_id()
        .ok_or_else(|| TransportError::NotFound(format!("envelope {} has no transport id", envelope.id)))?;
    id.parse::<u64>()
        .map_err(|_| TransportError::NotFound(id.to_string()))
}
