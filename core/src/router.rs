//! Relay Router — classifies inbound events and re-emits them to the right
//! destinations.
//!
//! The router owns no presence state of its own; every identity lookup goes
//! through the [`IdentityRegistry`]. Delivery is best-effort fire-and-forget:
//! an offline target means the event is dropped, never an error back over
//! the wire.

use crate::protocol::{ChatMessage, ClientEvent, ServerEvent};
use crate::registry::{ConnectionId, EventSender, Identity, IdentityRegistry};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters reported by the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelayStats {
    /// Open connections right now.
    pub connections_active: usize,
    /// Identities with at least one open connection.
    pub identities_online: usize,
    /// Inbound events accepted by the router.
    pub events_routed: u64,
    /// Chat messages relayed (receiver delivery attempted).
    pub messages_relayed: u64,
    /// Call-signaling events relayed (offer/answer/ICE/hang-up).
    pub call_signals_relayed: u64,
    /// Outbound events handed to connection queues.
    pub events_delivered: u64,
    /// Presence broadcasts sent.
    pub broadcasts_sent: u64,
    /// Events dropped: malformed frames, unbound senders, empty identities.
    pub events_dropped: u64,
}

#[derive(Default)]
struct Counters {
    events_routed: u64,
    messages_relayed: u64,
    call_signals_relayed: u64,
    events_delivered: u64,
    broadcasts_sent: u64,
    events_dropped: u64,
}

/// The relay's protocol core. One per process; cheap to share behind an Arc.
pub struct RelayRouter {
    registry: Arc<IdentityRegistry>,
    counters: RwLock<Counters>,
}

impl RelayRouter {
    pub fn new(registry: Arc<IdentityRegistry>) -> Self {
        Self {
            registry,
            counters: RwLock::new(Counters::default()),
        }
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Track a newly accepted connection and hand back its handle.
    pub fn handle_connect(&self, tx: EventSender) -> ConnectionId {
        let conn = self.registry.register(tx);
        debug!(%conn, "client connected");
        conn
    }

    /// Parse one raw text frame and route it. Malformed frames (bad JSON,
    /// unknown event kind, missing required field) are logged and dropped;
    /// nothing is ever sent back to the offending client.
    pub fn handle_frame(&self, conn: ConnectionId, frame: &str) {
        match serde_json::from_str::<ClientEvent>(frame) {
            Ok(event) => self.handle_event(conn, event),
            Err(err) => {
                warn!(%conn, %err, "dropping malformed frame");
                self.counters.write().events_dropped += 1;
            }
        }
    }

    /// Route one parsed event.
    pub fn handle_event(&self, conn: ConnectionId, event: ClientEvent) {
        self.counters.write().events_routed += 1;
        match event {
            ClientEvent::Join { identity } => self.on_join(conn, identity),
            ClientEvent::NewMessage(message) => self.on_new_message(message),
            ClientEvent::CallUser {
                caller_identity,
                callee_identity,
                offer,
                call_type,
                caller_display_name,
                caller_photo,
            } => {
                info!(caller = %caller_identity, callee = %callee_identity, ?call_type, "relaying call offer");
                self.counters.write().call_signals_relayed += 1;
                self.emit(
                    &callee_identity,
                    ServerEvent::IncomingCall {
                        caller_identity,
                        offer,
                        call_type,
                        caller_display_name,
                        caller_photo,
                    },
                );
            }
            ClientEvent::AnswerCall {
                target_identity,
                answer,
            } => {
                let Some(from_identity) = self.bound_identity(conn, "answerCall") else {
                    return;
                };
                self.counters.write().call_signals_relayed += 1;
                self.emit(
                    &target_identity,
                    ServerEvent::CallAnswered {
                        from_identity: from_identity.clone(),
                        answer: answer.clone(),
                    },
                );
                // Confirmation back to the answering identity; with multiple
                // tabs open only one of them took the call, the rest learn of
                // it here. A failed delivery is a drop, not an error.
                self.emit(
                    &from_identity,
                    ServerEvent::CallAnswered2 {
                        from_identity: from_identity.clone(),
                        answer,
                    },
                );
            }
            ClientEvent::SendIceCandidate {
                target_identity,
                candidate,
            } => {
                let Some(from_identity) = self.bound_identity(conn, "sendICECandidate") else {
                    return;
                };
                self.counters.write().call_signals_relayed += 1;
                self.emit(
                    &target_identity,
                    ServerEvent::IceCandidate {
                        from_identity,
                        candidate,
                    },
                );
            }
            ClientEvent::EndCall { target_identity } => {
                let Some(from_identity) = self.bound_identity(conn, "endCall") else {
                    return;
                };
                self.counters.write().call_signals_relayed += 1;
                self.emit(&target_identity, ServerEvent::CallEnded { from_identity });
            }
        }
    }

    /// Transport disconnect: release the binding and re-broadcast presence.
    pub fn handle_disconnect(&self, conn: ConnectionId) {
        match self.registry.leave(conn) {
            Some(identity) => info!(%conn, %identity, "client disconnected, identity offline"),
            None => debug!(%conn, "client disconnected"),
        }
        self.broadcast_presence();
    }

    /// Current counters plus live registry gauges.
    pub fn stats(&self) -> RelayStats {
        let counters = self.counters.read();
        RelayStats {
            connections_active: self.registry.connection_count(),
            identities_online: self.registry.identity_count(),
            events_routed: counters.events_routed,
            messages_relayed: counters.messages_relayed,
            call_signals_relayed: counters.call_signals_relayed,
            events_delivered: counters.events_delivered,
            broadcasts_sent: counters.broadcasts_sent,
            events_dropped: counters.events_dropped,
        }
    }

    fn on_join(&self, conn: ConnectionId, identity: Identity) {
        match self.registry.join(conn, &identity) {
            Ok(()) => {
                info!(%conn, %identity, "identity joined");
                // Every join re-broadcasts, even a repeated one.
                self.broadcast_presence();
            }
            Err(err) => {
                warn!(%conn, %err, "dropping join");
                self.counters.write().events_dropped += 1;
            }
        }
    }

    fn on_new_message(&self, message: ChatMessage) {
        self.counters.write().messages_relayed += 1;

        if !self.registry.is_reachable(&message.receiver_identity) {
            // Persisted history re-delivers on next fetch; nothing to do
            // here beyond the diagnostic.
            info!(
                receiver = %message.receiver_identity,
                sender = %message.sender_identity,
                "receiver offline, message not relayed"
            );
        } else {
            self.emit(
                &message.receiver_identity,
                ServerEvent::MessageReceived(message.clone()),
            );
        }

        // Echo to the sender's own connections for local display.
        let sender_identity = message.sender_identity.clone();
        self.emit(
            &sender_identity,
            ServerEvent::MessageReceivedForDisplay(message),
        );
    }

    /// The sending connection's bound identity, or a logged drop when the
    /// connection never joined.
    fn bound_identity(&self, conn: ConnectionId, kind: &str) -> Option<Identity> {
        match self.registry.identity_of(conn) {
            Some(identity) => Some(identity),
            None => {
                warn!(%conn, kind, "dropping event from connection with no bound identity");
                self.counters.write().events_dropped += 1;
                None
            }
        }
    }

    /// Deliver `event` to every live connection bound to `identity`.
    /// Resolution failure means the identity is offline: a silent drop.
    fn emit(&self, identity: &str, event: ServerEvent) {
        let senders = self.registry.resolve(identity);
        if senders.is_empty() {
            debug!(%identity, "no live destination, dropping event");
            return;
        }
        let mut delivered = 0u64;
        for tx in senders {
            // A closed queue means the connection is mid-teardown; its
            // disconnect cleanup is already on the way.
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        self.counters.write().events_delivered += delivered;
    }

    /// Send the current reachable set to every open connection.
    fn broadcast_presence(&self) {
        let users = self.registry.snapshot();
        let event = ServerEvent::OnlineUsersList { users };
        let mut delivered = 0u64;
        for tx in self.registry.all_senders() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        let mut counters = self.counters.write();
        counters.broadcasts_sent += 1;
        counters.events_delivered += delivered;
    }
}

// ============================================================================
// TESTS
// ============================================================================
