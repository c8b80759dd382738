//! Events of the document listener stream.

use chrono::{DateTime, Utc};
use docsync_codec::Value;
use docsync_core::{Mutation, MutationOperation};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};
use crate::sse::SseFrame;

/// How a mutation changed the visibility of a document to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// The document started to exist.
    Appear,
    /// The document changed.
    #[default]
    Update,
    /// The document was deleted.
    Disappear,
}

/// When the mutation became visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to queries.
    #[default]
    Query,
    /// Committed, not yet visible to queries.
    Transaction,
}

/// First event of every listener connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeEvent {
    /// Server-side name of the listener.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener_name: Option<String>,
}

/// The server closed the stream and will not reconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectEvent {
    /// Why the stream was closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One document's share of a committed transaction.
///
/// A transaction touching several documents arrives as several events with
/// the same `transaction_id`; `transaction_total_events` says how many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEvent {
    /// Unique event id.
    pub event_id: String,
    /// The document this event is about.
    pub document_id: String,
    /// The transaction that produced it.
    pub transaction_id: String,
    /// Visibility change of the document.
    #[serde(default)]
    pub transition: Transition,
    /// Author identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Operations of the transaction, for every document it touched.
    #[serde(default)]
    pub mutations: Vec<MutationOperation>,
    /// Revision of the document before the transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_rev: Option<String>,
    /// Revision of the document after it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_rev: Option<String>,
    /// When the transaction was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Opaque effects payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Value>,
    /// Number of events the transaction was split into.
    #[serde(default = "one")]
    pub transaction_total_events: usize,
    /// Position of this event within the transaction, starting at 1.
    #[serde(default = "one")]
    pub transaction_current_event: usize,
    /// When the mutation became visible.
    #[serde(default)]
    pub visibility: Visibility,
}

fn one() -> usize {
    1
}

impl MutationEvent {
    /// Creates a single-part event.
    pub fn new(
        document_id: impl Into<String>,
        transaction_id: impl Into<String>,
        mutations: Vec<MutationOperation>,
    ) -> Self {
        let transaction_id = transaction_id.into();
        let document_id = document_id.into();
        Self {
            event_id: format!("{transaction_id}#{document_id}"),
            document_id,
            transaction_id,
            transition: Transition::Update,
            identity: None,
            mutations,
            previous_rev: None,
            result_rev: None,
            timestamp: None,
            effects: None,
            transaction_total_events: 1,
            transaction_current_event: 1,
            visibility: Visibility::Query,
        }
    }

    /// Sets the revision chain.
    #[must_use]
    pub fn with_revisions(mut self, previous: Option<String>, result: Option<String>) -> Self {
        self.previous_rev = previous;
        self.result_rev = result;
        self
    }

    /// Sets the transition.
    #[must_use]
    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = transition;
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Marks the event as part `current` of `total`.
    #[must_use]
    pub fn with_part(mut self, current: usize, total: usize) -> Self {
        self.transaction_current_event = current;
        self.transaction_total_events = total;
        self
    }

    /// True when the transaction was split over several events.
    pub fn is_partial(&self) -> bool {
        self.transaction_total_events > 1
    }

    /// The mutation this event applies to its document.
    ///
    /// Operations aimed at other documents of the same transaction are
    /// dropped.
    pub fn to_mutation(&self) -> Mutation {
        let mutation = Mutation {
            operations: self.mutations.clone(),
            transaction_id: Some(self.transaction_id.clone()),
            previous_rev: self.previous_rev.clone(),
            result_rev: self.result_rev.clone(),
            identity: self.identity.clone(),
            timestamp: self.timestamp,
            effects: self.effects.clone(),
        };
        mutation.for_document(&self.document_id)
    }
}

/// An event of the listener stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ListenerEvent {
    /// The listener is connected.
    Welcome(WelcomeEvent),
    /// A transaction touched a followed document.
    Mutation(MutationEvent),
    /// The connection dropped and is being re-established.
    Reconnect,
    /// The server ended the stream.
    Disconnect(DisconnectEvent),
}

impl ListenerEvent {
    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome(_) => "welcome",
            Self::Mutation(_) => "mutation",
            Self::Reconnect => "reconnect",
            Self::Disconnect(_) => "disconnect",
        }
    }

    /// Document id of a mutation event.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::Mutation(event) => Some(&event.document_id),
            _ => None,
        }
    }

    /// Decodes a server-sent event frame.
    ///
    /// Returns `None` for frames that carry no listener event, such as
    /// keep-alives or unknown event names.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON data and on `channelError` frames.
    pub fn from_frame(frame: &SseFrame) -> ProtocolResult<Option<Self>> {
        let data = frame.data.trim();
        let event = match frame.event.as_str() {
            "welcome" => Self::Welcome(parse_or_default(data)?),
            "mutation" => Self::Mutation(serde_json::from_str(data)?),
            "reconnect" => Self::Reconnect,
            "disconnect" => Self::Disconnect(parse_or_default(data)?),
            "channelError" => {
                let message = serde_json::from_str::<serde_json::Value>(data)
                    .ok()
                    .and_then(|body| body.get("message")?.as_str().map(str::to_string))
                    .unwrap_or_else(|| data.to_string());
                return Err(ProtocolError::ChannelError { message });
            }
            "message" if data.starts_with('{') => serde_json::from_str(data)?,
            other => {
                trace!(event = other, "ignoring frame");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    /// Encodes the event as a server-sent event frame.
    ///
    /// # Errors
    ///
    /// Fails when the payload cannot be encoded as JSON.
    pub fn to_frame(&self) -> ProtocolResult<SseFrame> {
        let data = match self {
            Self::Welcome(event) => serde_json::to_string(event)?,
            Self::Mutation(event) => serde_json::to_string(event)?,
            Self::Reconnect => String::new(),
            Self::Disconnect(event) => serde_json::to_string(event)?,
        };
        let id = match self {
            Self::Mutation(event) => Some(event.event_id.clone()),
            _ => None,
        };
        Ok(SseFrame {
            event: self.kind().to_string(),
            data,
            id,
        })
    }
}

fn parse_or_default<T: Default + serde::de::DeserializeOwned>(data: &str) -> ProtocolResult<T> {
    if data.is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(data)?)
}
