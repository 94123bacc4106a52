//! Registry of requests waiting for a response
//!
//! Register, scan-and-complete and remove all take the same lock, so an entry
//! is either visible to a scan or registered after it, never half-way.
//! Scans run in registration order and the first matching entry wins.

use fimp_core::Message;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Bookkeeping for one outstanding request
#[derive(Debug)]
pub struct PendingRequest {
    request_uid: String,
    response_topic: String,
    service_filter: String,
    msg_type_filter: String,
    /// Taken on completion; `None` marks the entry as completed
    waiter: Option<oneshot::Sender<Message>>,
}

impl PendingRequest {
    /// Create an entry and the receiver its response will be delivered to
    ///
    /// Empty filters accept any service or message type.
    pub fn new(
        request_uid: impl Into<String>,
        response_topic: impl Into<String>,
        service_filter: impl Into<String>,
        msg_type_filter: impl Into<String>,
    ) -> (Self, oneshot::Receiver<Message>) {
        let (tx, rx) = oneshot::channel();
        let entry = Self {
            request_uid: request_uid.into(),
            response_topic: response_topic.into(),
            service_filter: service_filter.into(),
            msg_type_filter: msg_type_filter.into(),
            waiter: Some(tx),
        };
        (entry, rx)
    }

    pub fn request_uid(&self) -> &str {
        &self.request_uid
    }

    pub fn response_topic(&self) -> &str {
        &self.response_topic
    }

    pub fn is_completed(&self) -> bool {
        self.waiter.is_none()
    }

    fn accepts(&self, topic: &str, response: &Message, match_by_correlation_id: bool) -> bool {
        self.response_topic == topic
            && (self.service_filter.is_empty() || self.service_filter == response.service)
            && (self.msg_type_filter.is_empty() || self.msg_type_filter == response.msg_type)
            && (!match_by_correlation_id || response.corid == self.request_uid)
    }
}

/// Thread-safe table of [`PendingRequest`]s keyed by request uid
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    entries: Mutex<IndexMap<String, PendingRequest>>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, refusing to replace one with the same uid
    pub fn register(&self, entry: PendingRequest) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&entry.request_uid) {
            return Err(Error::DuplicateRequest(entry.request_uid));
        }
        entries.insert(entry.request_uid.clone(), entry);
        Ok(())
    }

    /// Complete the first waiting entry accepting `response` on `topic`
    ///
    /// Completed entries stay in the table until their waiter removes them and
    /// are skipped by later scans. Returns whether an entry was completed.
    pub fn match_and_complete(
        &self,
        topic: &str,
        response: &Message,
        match_by_correlation_id: bool,
    ) -> bool {
        let mut entries = self.entries.lock();
        for entry in entries.values_mut() {
            if !entry.accepts(topic, response, match_by_correlation_id) {
                continue;
            }
            let Some(waiter) = entry.waiter.take() else {
                continue;
            };
            if waiter.send(response.clone()).is_err() {
                // Waiter gave up between timing out and removing its entry
                tracing::debug!(uid = %entry.request_uid, "pending request no longer awaited");
                continue;
            }
            tracing::debug!(uid = %entry.request_uid, topic, "pending request completed");
            return true;
        }
        false
    }

    /// Remove an entry; removing an absent uid is a no-op
    pub fn remove(&self, request_uid: &str) -> Option<PendingRequest> {
        self.entries.lock().shift_remove(request_uid)
    }

    pub fn contains(&self, request_uid: &str) -> bool {
        self.entries.lock().contains_key(request_uid)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "pt:j1/mt:evt/rt:dev/rn:test/ad:1/sv:out_bin_switch/ad:1";

    fn reply(service: &str, msg_type: &str) -> Message {
        Message::new_bool(msg_type, service, true)
    }

    #[test]
    fn duplicate_uid_is_rejected() {
        let table = PendingRequestTable::new();
        let (first, _rx1) = PendingRequest::new("uid-1", TOPIC, "", "");
        let (second, _rx2) = PendingRequest::new("uid-1", TOPIC, "", "");

        table.register(first).unwrap();
        match table.register(second) {
            Err(Error::DuplicateRequest(uid)) => assert_eq!(uid, "uid-1"),
            other => panic!("Expected DuplicateRequest, got {:?}", other),
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn match_requires_topic_and_filters() {
        let table = PendingRequestTable::new();
        let (entry, mut rx) = PendingRequest::new("uid-1", TOPIC, "B", "evt.binary.report");
        table.register(entry).unwrap();

        assert!(!table.match_and_complete("other/topic", &reply("B", "evt.binary.report"), false));
        assert!(!table.match_and_complete(TOPIC, &reply("A", "evt.binary.report"), false));
        assert!(!table.match_and_complete(TOPIC, &reply("B", "evt.other"), false));
        assert!(rx.try_recv().is_err());

        assert!(table.match_and_complete(TOPIC, &reply("B", "evt.binary.report"), false));
        assert_eq!(rx.try_recv().unwrap().service, "B");
    }

    #[test]
    fn completed_entry_is_kept_until_removed() {
        let table = PendingRequestTable::new();
        let (entry, _rx) = PendingRequest::new("uid-1", TOPIC, "", "");
        table.register(entry).unwrap();

        assert!(table.match_and_complete(TOPIC, &reply("A", "evt.x"), false));
        assert!(table.contains("uid-1"));

        // Already completed, not matched again
        assert!(!table.match_and_complete(TOPIC, &reply("A", "evt.x"), false));

        assert!(table.remove("uid-1").unwrap().is_completed());
        assert!(table.remove("uid-1").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn identical_entries_complete_in_registration_order() {
        let table = PendingRequestTable::new();
        let (first, mut rx1) = PendingRequest::new("uid-1", TOPIC, "", "");
        let (second, mut rx2) = PendingRequest::new("uid-2", TOPIC, "", "");
        table.register(first).unwrap();
        table.register(second).unwrap();

        let one = reply("A", "evt.first");
        assert!(table.match_and_complete(TOPIC, &one, false));
        assert_eq!(rx1.try_recv().unwrap().msg_type, "evt.first");
        assert!(rx2.try_recv().is_err());

        let two = reply("A", "evt.second");
        assert!(table.match_and_complete(TOPIC, &two, false));
        assert_eq!(rx2.try_recv().unwrap().msg_type, "evt.second");
    }

    #[test]
    fn removal_preserves_order_of_remaining_entries() {
        let table = PendingRequestTable::new();
        let (a, _rx_a) = PendingRequest::new("a", TOPIC, "", "");
        let (b, mut rx_b) = PendingRequest::new("b", TOPIC, "", "");
        let (c, mut rx_c) = PendingRequest::new("c", TOPIC, "", "");
        table.register(a).unwrap();
        table.register(b).unwrap();
        table.register(c).unwrap();

        table.remove("a");
        assert!(table.match_and_complete(TOPIC, &reply("A", "evt.x"), false));
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn correlation_id_mode() {
        let table = PendingRequestTable::new();
        let (entry, mut rx) = PendingRequest::new("req-uid", TOPIC, "", "");
        table.register(entry).unwrap();

        let unrelated = reply("A", "evt.x");
        assert!(!table.match_and_complete(TOPIC, &unrelated, true));

        let mut related = reply("A", "evt.x");
        related.corid = "req-uid".to_string();
        assert!(table.match_and_complete(TOPIC, &related, true));
        assert_eq!(rx.try_recv().unwrap().corid, "req-uid");
    }

    #[test]
    fn dropped_waiter_passes_message_on() {
        let table = PendingRequestTable::new();
        let (gone, rx_gone) = PendingRequest::new("gone", TOPIC, "", "");
        let (live, mut rx_live) = PendingRequest::new("live", TOPIC, "", "");
        table.register(gone).unwrap();
        table.register(live).unwrap();
        drop(rx_gone);

        assert!(table.match_and_complete(TOPIC, &reply("A", "evt.x"), false));
        assert!(rx_live.try_recv().is_ok());
    }
}
