//! Request routing: one request line in, one response line out.

use crate::topic::TopicStore;
use quafka_core::{
    protocol::{Request, Response},
    PollPosition, Topic,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Applies parsed requests to a [`TopicStore`].
#[derive(Debug, Clone)]
pub struct RequestRouter {
    store: Arc<TopicStore>,
    default_topic: Topic,
}

impl RequestRouter {
    /// Router publishing `TEXT` requests into `default_topic`.
    pub fn new(store: Arc<TopicStore>, default_topic: Topic) -> Self {
        Self { store, default_topic }
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<TopicStore> {
        &self.store
    }

    /// Topic receiving `TEXT` requests.
    pub fn default_topic(&self) -> &Topic {
        &self.default_topic
    }

    /// Handle one raw line. Malformed input becomes an error response; this
    /// never fails.
    pub fn handle_line(&self, line: &str) -> String {
        let response = match Request::parse(line) {
            Ok(request) => self.route(request),
            Err(violation) => {
                warn!("Rejected request {:?}: {}", line, violation);
                Response::violation(&violation)
            },
        };
        response.encode()
    }

    /// Apply a parsed request.
    pub fn route(&self, request: Request) -> Response {
        match request {
            Request::Text(content) => {
                let placed = self.store.publish(&self.default_topic, content);
                debug!("TEXT stored in '{}' at {}", self.default_topic, placed);
                Response::Published(placed)
            },
            Request::Poll { topic, partition } => {
                match self.store.poll(&topic, partition, PollPosition::Next) {
                    Some(message) => match message.payload_text() {
                        Some(payload) => Response::Message { payload, offset: message.offset },
                        None => Response::Empty,
                    },
                    None => Response::Empty,
                }
            },
            Request::Commit(group) => {
                debug!("COMMIT acknowledged for group '{}'", group);
                Response::Committed(group)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quafka_core::protocol::constants::DEFAULT_TOPIC;

    fn router() -> RequestRouter {
        RequestRouter::new(
            Arc::new(TopicStore::with_partitions(1)),
            Topic::new(DEFAULT_TOPIC).unwrap(),
        )
    }

    #[test]
    fn test_text_then_poll() {
        let router = router();
        assert_eq!(
            router.handle_line("TEXT:hello"),
            "OK: Mesaj topic'e eklendi (partition: 0, offset: 0)"
        );
        assert_eq!(router.handle_line("POLL:default-topic:0"), "OK: hello (offset: 0)");
        assert_eq!(router.handle_line("POLL:default-topic:0"), "OK: Mesaj bulunamadı");
    }

    #[test]
    fn test_poll_empty_and_unknown() {
        let router = router();
        assert_eq!(router.handle_line("POLL:default-topic:0"), "OK: Mesaj bulunamadı");
        assert_eq!(router.handle_line("POLL:missing:7"), "OK: Mesaj bulunamadı");
    }

    #[test]
    fn test_commit_is_acknowledged() {
        assert_eq!(router().handle_line("COMMIT:g1"), "OK: g1 için commit başarılı");
    }

    #[test]
    fn test_errors() {
        let router = router();
        assert_eq!(router.handle_line(""), "HATA: Boş mesaj");
        assert_eq!(router.handle_line("nonsense"), "HATA: Geçersiz mesaj formatı");
        assert_eq!(
            router.handle_line("POLL:default-topic"),
            "HATA: Geçersiz POLL formatı (topic:partition)"
        );
        assert_eq!(router.handle_line("POLL:t:abc"), "HATA: Geçersiz partition: abc");
        assert_eq!(router.handle_line("DROP:x"), "HATA: Bilinmeyen komut: DROP");
    }
}
