//! Wire protocol — inbound and outbound relay events and their JSON shapes.
//!
//! Every frame on the wire is a JSON object tagged with a `type` field.
//! Inbound frames parse into the closed [`ClientEvent`] union; anything that
//! does not parse (missing required field, unrecognized kind) is rejected at
//! the boundary and never reaches the router.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of media session being negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Audio,
    Video,
}

/// A chat message as relayed between two identities.
///
/// The relay treats `post_details` as an opaque blob owned by the feed
/// collaborator; `offer`/`answer`/`candidate` payloads elsewhere get the
/// same treatment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub chat_id: String,
    pub sender_identity: String,
    pub receiver_identity: String,
    pub message: String,
    #[serde(default)]
    pub is_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_sent: Option<String>,
    #[serde(default)]
    pub is_post: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_details: Option<Value>,
}

/// Inbound events a client may send over its connection.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Bind the sending connection to a user identity.
    #[serde(rename = "join")]
    Join { identity: String },

    /// Relay a chat message to its receiver, echoing to the sender.
    #[serde(rename = "newMessage")]
    NewMessage(ChatMessage),

    /// Start a call: forward the WebRTC offer to the callee.
    #[serde(rename = "callUser")]
    #[serde(rename_all = "camelCase")]
    CallUser {
        caller_identity: String,
        callee_identity: String,
        offer: Value,
        call_type: CallType,
        #[serde(default)]
        caller_display_name: Option<String>,
        #[serde(default)]
        caller_photo: Option<String>,
    },

    /// Answer a call: forward the answer to the caller and confirm back
    /// to the answering party's own connections.
    #[serde(rename = "answerCall")]
    #[serde(rename_all = "camelCase")]
    AnswerCall {
        target_identity: String,
        /// Opaque SDP answer, or a bare bool for a declined call.
        answer: Value,
    },

    /// Forward one ICE candidate to the other party.
    #[serde(rename = "sendICECandidate")]
    #[serde(rename_all = "camelCase")]
    SendIceCandidate {
        target_identity: String,
        candidate: Value,
    },

    /// Hang up: notify the other party.
    #[serde(rename = "endCall")]
    #[serde(rename_all = "camelCase")]
    EndCall { target_identity: String },
}

/// Outbound events the relay emits to client connections.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Presence broadcast: every identity currently reachable.
    #[serde(rename = "onlineUsersList")]
    OnlineUsersList { users: Vec<String> },

    /// A chat message addressed to this connection's identity.
    #[serde(rename = "messageReceived")]
    MessageReceived(ChatMessage),

    /// Echo of a chat message back to its sender, for local display.
    #[serde(rename = "messageReceivedForDisplay")]
    MessageReceivedForDisplay(ChatMessage),

    /// Someone is calling this connection's identity.
    #[serde(rename = "incomingCall")]
    #[serde(rename_all = "camelCase")]
    IncomingCall {
        caller_identity: String,
        offer: Value,
        call_type: CallType,
        #[serde(skip_serializing_if = "Option::is_none")]
        caller_display_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        caller_photo: Option<String>,
    },

    /// The callee answered; delivered to the original caller.
    #[serde(rename = "callAnswered")]
    #[serde(rename_all = "camelCase")]
    CallAnswered { from_identity: String, answer: Value },

    /// Confirmation of the answer, delivered back to the answering identity.
    #[serde(rename = "callAnswered2")]
    #[serde(rename_all = "camelCase")]
    CallAnswered2 { from_identity: String, answer: Value },

    /// An ICE candidate from the other party.
    #[serde(rename = "iceCandidate")]
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        from_identity: String,
        candidate: Value,
    },

    /// The other party hung up.
    #[serde(rename = "callEnded")]
    #[serde(rename_all = "camelCase")]
    CallEnded { from_identity: String },
}

impl ServerEvent {
    /// Serialize for the wire. Infallible shapes only; a serialization
    /// failure is a bug, so surface it to the caller for logging.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"join","identity":"a@x.com"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Join {
                identity: "a@x.com".to_string()
            }
        );
    }

    #[test]
    fn test_parse_new_message_minimal() {
        // Optional fields (imageUrl, timeSent, postDetails) may be absent.
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "newMessage",
            "chatId": "c1",
            "senderIdentity": "alice",
            "receiverIdentity": "bob",
            "message": "hi",
            "isImage": false,
            "isPost": false,
        }))
        .unwrap();

        match event {
            ClientEvent::NewMessage(msg) => {
                assert_eq!(msg.chat_id, "c1");
                assert_eq!(msg.sender_identity, "alice");
                assert_eq!(msg.receiver_identity, "bob");
                assert_eq!(msg.message, "hi");
                assert!(!msg.is_image);
                assert!(msg.image_url.is_none());
                assert!(msg.post_details.is_none());
            }
            other => panic!("wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_new_message_with_post() {
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "newMessage",
            "chatId": "c2",
            "senderIdentity": "alice",
            "receiverIdentity": "bob",
            "message": "",
            "isPost": true,
            "postDetails": {"postId": "p1", "caption": "sunset"},
        }))
        .unwrap();

        match event {
            ClientEvent::NewMessage(msg) => {
                assert!(msg.is_post);
                assert_eq!(msg.post_details.unwrap()["postId"], "p1");
            }
            other => panic!("wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_field_rejected() {
        // newMessage without a receiver is malformed.
        let result: Result<ClientEvent, _> = serde_json::from_value(json!({
            "type": "newMessage",
            "chatId": "c1",
            "senderIdentity": "alice",
            "message": "hi",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type":"sendOfferAnswer","toEmail":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_call_user() {
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "callUser",
            "callerIdentity": "alice",
            "calleeIdentity": "bob",
            "offer": "SDP1",
            "callType": "video",
        }))
        .unwrap();

        match event {
            ClientEvent::CallUser {
                callee_identity,
                call_type,
                offer,
                ..
            } => {
                assert_eq!(callee_identity, "bob");
                assert_eq!(call_type, CallType::Video);
                assert_eq!(offer, json!("SDP1"));
            }
            other => panic!("wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_answer_may_be_bool() {
        // A declined call sends `answer: false` instead of an SDP blob.
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "answerCall",
            "targetIdentity": "alice",
            "answer": false,
        }))
        .unwrap();

        match event {
            ClientEvent::AnswerCall { answer, .. } => assert_eq!(answer, json!(false)),
            other => panic!("wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_ice_candidate_event_name() {
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "sendICECandidate",
            "targetIdentity": "bob",
            "candidate": {"sdpMid": "0"},
        }))
        .unwrap();
        assert!(matches!(event, ClientEvent::SendIceCandidate { .. }));
    }

    #[test]
    fn test_online_users_list_wire_shape() {
        let json = ServerEvent::OnlineUsersList {
            users: vec!["a@x.com".to_string(), "b@x.com".to_string()],
        }
        .to_json()
        .unwrap();

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "onlineUsersList");
        assert_eq!(value["users"][0], "a@x.com");
    }

    #[test]
    fn test_message_received_wire_shape() {
        let event = ServerEvent::MessageReceived(ChatMessage {
            chat_id: "c1".to_string(),
            sender_identity: "alice".to_string(),
            receiver_identity: "bob".to_string(),
            message: "hi".to_string(),
            is_image: false,
            image_url: None,
            time_sent: Some("2026-01-01T00:00:00Z".to_string()),
            is_post: false,
            post_details: None,
        });

        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "messageReceived");
        assert_eq!(value["chatId"], "c1");
        assert_eq!(value["senderIdentity"], "alice");
        assert_eq!(value["message"], "hi");
        // Absent optionals stay off the wire entirely.
        assert!(value.get("imageUrl").is_none());
    }

    #[test]
    fn test_call_ended_wire_shape() {
        let value: Value = serde_json::from_str(
            &ServerEvent::CallEnded {
                from_identity: "bob".to_string(),
            }
            .to_json()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(value["type"], "callEnded");
        assert_eq!(value["fromIdentity"], "bob");
    }
}
