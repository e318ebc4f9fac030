//! The rendered message list.

use crate::chat::{MessageId, MessageRecord};
use crate::render::{self, Affordances, MessageView, Node};

use super::ViewUpdate;

/// Ordered, id-keyed list of rendered messages.
///
/// Every mutation returns the [`ViewUpdate`]s a browser needs to mirror it.
/// Ids are unique: appending a rendered id again is a no-op.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    entries: Vec<MessageRecord>,
    affordances: Affordances,
}

impl MessageList {
    #[must_use]
    pub fn new(affordances: Affordances) -> Self {
        Self {
            entries: Vec::new(),
            affordances,
        }
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries.iter().position(|r| &r.id == id)
    }

    fn fragment_html(&self, record: &MessageRecord) -> String {
        render::message_fragment(&MessageView::from(record), self.affordances).to_html()
    }

    /// Append a message at the end, unless it is already rendered.
    pub fn append(&mut self, record: MessageRecord) -> Option<ViewUpdate> {
        if self.contains(&record.id) {
            return None;
        }
        let update = ViewUpdate::Append {
            id: record.id.clone(),
            html: self.fragment_html(&record),
        };
        self.entries.push(record);
        Some(update)
    }

    /// Remove the message with this id, if rendered.
    pub fn remove(&mut self, id: &MessageId) -> Option<ViewUpdate> {
        let pos = self.position(id)?;
        self.entries.remove(pos);
        Some(ViewUpdate::Remove { id: id.clone() })
    }

    /// Patch a rendered message in place, moving it if its date changed
    /// its position. Unrendered ids are ignored.
    pub fn replace(&mut self, record: MessageRecord) -> Option<ViewUpdate> {
        let pos = self.position(&record.id)?;
        let html = self.fragment_html(&record);
        let id = record.id.clone();

        self.entries.remove(pos);
        // After every remaining entry dated at or before this one.
        let target = self
            .entries
            .iter()
            .position(|r| r.data.date > record.data.date)
            .unwrap_or(self.entries.len());
        let before = self.entries.get(target).map(|r| r.id.clone());
        self.entries.insert(target, record);

        if target == pos {
            Some(ViewUpdate::Replace { id, html })
        } else {
            Some(ViewUpdate::Move { id, html, before })
        }
    }

    /// Replace the whole list with `records`, already in display order.
    pub fn reset(&mut self, records: Vec<MessageRecord>) -> ViewUpdate {
        self.entries = records;
        // A store that hands back duplicates must not render them twice.
        let mut seen = std::collections::HashSet::new();
        self.entries.retain(|r| seen.insert(r.id.clone()));
        ViewUpdate::Reset {
            html: self.render().to_html(),
        }
    }

    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&MessageRecord> {
        self.entries.iter().find(|r| &r.id == id)
    }

    #[must_use]
    pub fn records(&self) -> &[MessageRecord] {
        &self.entries
    }

    #[must_use]
    pub fn ids(&self) -> Vec<MessageId> {
        self.entries.iter().map(|r| r.id.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn affordances(&self) -> Affordances {
        self.affordances
    }

    /// Render the `#messages` container.
    #[must_use]
    pub fn render(&self) -> Node {
        let views: Vec<MessageView> = self.entries.iter().map(MessageView::from).collect();
        render::message_list(views.iter(), self.affordances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Message;
    use chrono::{TimeZone, Utc};

    fn rec(id: &str, text: &str, secs: i64) -> MessageRecord {
        MessageRecord::new(
            id,
            Message {
                username: "anna".into(),
                message: text.into(),
                date: Utc.timestamp_opt(secs, 0).unwrap(),
                my_timestamp: secs.to_string(),
            },
        )
    }

    fn ids(list: &MessageList) -> Vec<String> {
        list.ids().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_append_is_keyed_by_id() {
        let mut list = MessageList::default();
        assert!(list.append(rec("a", "x", 1)).is_some());
        assert!(list.append(rec("a", "x", 1)).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_only_matching_id() {
        let mut list = MessageList::default();
        list.append(rec("a", "x", 1));
        list.append(rec("b", "y", 2));
        list.append(rec("c", "z", 3));

        assert_eq!(
            list.remove(&MessageId::from("b")),
            Some(ViewUpdate::Remove {
                id: MessageId::from("b")
            })
        );
        assert_eq!(ids(&list), ["a", "c"]);
        assert!(list.remove(&MessageId::from("b")).is_none());
    }

    #[test]
    fn test_replace_in_place_when_date_keeps_position() {
        let mut list = MessageList::default();
        list.append(rec("a", "x", 1));
        list.append(rec("b", "y", 3));

        let update = list.replace(rec("a", "edited", 2)).unwrap();
        assert!(matches!(update, ViewUpdate::Replace { .. }));
        assert_eq!(ids(&list), ["a", "b"]);
        assert_eq!(list.get(&MessageId::from("a")).unwrap().data.message, "edited");
    }

    #[test]
    fn test_replace_moves_restamped_message_to_end() {
        let mut list = MessageList::default();
        list.append(rec("a", "x", 1));
        list.append(rec("b", "y", 2));

        let update = list.replace(rec("a", "edited", 9)).unwrap();
        match update {
            ViewUpdate::Move { id, before, .. } => {
                assert_eq!(id, MessageId::from("a"));
                assert_eq!(before, None);
            }
            other => panic!("expected move, got {other:?}"),
        }
        assert_eq!(ids(&list), ["b", "a"]);
    }

    #[test]
    fn test_replace_unknown_id_is_ignored() {
        let mut list = MessageList::default();
        assert!(list.replace(rec("zz", "x", 1)).is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn test_reset_drops_duplicates() {
        let mut list = MessageList::default();
        let update = list.reset(vec![rec("a", "x", 1), rec("a", "x", 1), rec("b", "y", 2)]);

        assert_eq!(ids(&list), ["a", "b"]);
        match update {
            ViewUpdate::Reset { html } => assert_eq!(html.matches("data-id=\"a\"").count(), 1),
            other => panic!("expected reset, got {other:?}"),
        }
    }
}
