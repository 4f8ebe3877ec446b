// Gramline Relay Core — real-time signaling spine
//
// One process, in-memory only: identities map to live connections, chat
// messages fan out with a for-display echo, and WebRTC signaling frames are
// relayed between two parties. Persistence, auth, and media transport all
// live with external collaborators.

pub mod protocol;
pub mod registry;
pub mod router;

pub use protocol::{CallType, ChatMessage, ClientEvent, ServerEvent};
pub use registry::{ConnectionId, EventSender, Identity, IdentityRegistry, RegistryError};
pub use router::{RelayRouter, RelayStats};
