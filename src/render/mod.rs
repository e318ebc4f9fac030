//! Rendering of messages, the message list, and the edit overlay.
//!
//! Each function maps view data to a [`Node`] tree; nothing here touches
//! the store or the live view. The element ids and classes form the
//! contract with `static/chat.js`:
//!
//! - `#messages` list container, one `.message[data-id]` per message
//! - `.fa-trash-alt` / `.fa-pen` affordances with `data-target = id`
//! - `#popup` overlay holding `#edit`, `#edit-message`, `#close-popup`, `#save-message`

mod node;
pub mod page;

pub use node::{Element, Node, escape};

use crate::chat::{MessageId, MessageRecord};

/// What a rendered message shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub username: String,
    pub message: String,
    pub timestamp: String,
}

impl From<&MessageRecord> for MessageView {
    fn from(record: &MessageRecord) -> Self {
        Self {
            id: record.id.clone(),
            username: record.data.username.clone(),
            message: record.data.message.clone(),
            timestamp: record.data.my_timestamp.clone(),
        }
    }
}

/// Which per-message controls to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub delete: bool,
    pub edit: bool,
}

impl Default for Affordances {
    fn default() -> Self {
        Self {
            delete: true,
            edit: true,
        }
    }
}

/// DOM id of a rendered message.
#[must_use]
pub fn fragment_id(id: &MessageId) -> String {
    format!("msg-{id}")
}

fn affordance(class: &'static str, action: &'static str, label: &'static str, id: &MessageId) -> Element {
    Element::new("i")
        .class(format!("fas {class}"))
        .attr("data-action", action)
        .attr("data-target", id.as_str())
        .attr("role", "button")
        .attr("aria-label", label)
}

/// One message: author, timestamp, body, and its controls.
#[must_use]
pub fn message_fragment(view: &MessageView, affordances: Affordances) -> Node {
    let mut buttons = Element::new("div").class("message-edit-buttons");
    if affordances.delete {
        buttons = buttons.child(affordance("fa-trash-alt", "delete", "Delete message", &view.id));
    }
    if affordances.edit {
        buttons = buttons.child(affordance("fa-pen", "edit", "Edit message", &view.id));
    }

    Element::new("div")
        .class("message")
        .id(fragment_id(&view.id))
        .attr("data-id", view.id.as_str())
        .child(Element::new("i").class("fas fa-user"))
        .child(
            Element::new("div")
                .child(
                    Element::new("span")
                        .class("username")
                        .text(view.username.as_str())
                        .child(Element::new("time").text(view.timestamp.as_str())),
                )
                .child(Element::new("br"))
                .child(
                    Element::new("span")
                        .class("message-text")
                        .text(view.message.as_str()),
                ),
        )
        .child(buttons)
        .into()
}

/// The `#messages` container holding every message in order.
#[must_use]
pub fn message_list<'a>(
    views: impl IntoIterator<Item = &'a MessageView>,
    affordances: Affordances,
) -> Node {
    Element::new("div")
        .id("messages")
        .attr("aria-live", "polite")
        .children(views.into_iter().map(|v| message_fragment(v, affordances)))
        .into()
}

/// The edit overlay, pre-filled with `text`.
#[must_use]
pub fn edit_overlay(id: &MessageId, text: &str) -> Node {
    Element::new("div")
        .id("popup")
        .attr("data-target", id.as_str())
        .child(
            Element::new("form")
                .id("edit")
                .attr("data-target", id.as_str())
                .child(
                    Element::new("textarea")
                        .id("edit-message")
                        .attr("name", "message")
                        .text(text),
                )
                .child(
                    Element::new("div")
                        .class("popup-buttons")
                        .child(
                            Element::new("button")
                                .id("close-popup")
                                .attr("type", "button")
                                .text("Close"),
                        )
                        .child(
                            Element::new("button")
                                .id("save-message")
                                .attr("type", "submit")
                                .text("Save"),
                        ),
                ),
        )
        .into()
}
