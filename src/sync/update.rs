//! Incremental changes to the rendered view, as sent to browsers.

use axum::response::sse::Event;
use serde::Serialize;

use crate::chat::MessageId;

/// One change to the rendered `#messages` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ViewUpdate {
    /// Append a fragment at the end of the list.
    Append { id: MessageId, html: String },
    /// Remove the fragment with this id.
    Remove { id: MessageId },
    /// Swap a fragment's content in place.
    Replace { id: MessageId, html: String },
    /// Take a fragment out and re-insert it before `before`, or at the end.
    Move {
        id: MessageId,
        html: String,
        before: Option<MessageId>,
    },
    /// Replace the whole list.
    Reset { html: String },
}

impl ViewUpdate {
    /// SSE event name for this update.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Append { .. } => "append",
            Self::Remove { .. } => "remove",
            Self::Replace { .. } => "replace",
            Self::Move { .. } => "move",
            Self::Reset { .. } => "reset",
        }
    }

    /// The message this update targets, if any.
    #[must_use]
    pub fn id(&self) -> Option<&MessageId> {
        match self {
            Self::Append { id, .. }
            | Self::Remove { id }
            | Self::Replace { id, .. }
            | Self::Move { id, .. } => Some(id),
            Self::Reset { .. } => None,
        }
    }

    /// Encode as an SSE event.
    #[must_use]
    pub fn to_sse_event(&self) -> Event {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        Event::default().event(self.event_name()).data(json)
    }
}
