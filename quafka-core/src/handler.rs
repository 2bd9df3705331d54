//! Callback seam for text publishes observed on the client send path.

use crate::types::PartitionOffset;
use std::sync::Arc;

/// Receives the content of every `TEXT:` request a connection sends.
///
/// Connections hold an optional handler and invoke it after the request has
/// been answered; the broker crate supplies an implementation that appends the
/// content to a local topic store.
pub trait TextMessageHandler: Send + Sync {
    /// Handle one text publish. Returns where the content was placed, if anywhere.
    fn on_text_message(&self, content: &str) -> Option<PartitionOffset>;
}

/// Shared handler reference.
pub type SharedTextHandler = Arc<dyn TextMessageHandler>;

impl<F> TextMessageHandler for F
where
    F: Fn(&str) -> Option<PartitionOffset> + Send + Sync,
{
    fn on_text_message(&self, content: &str) -> Option<PartitionOffset> {
        self(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Offset, PartitionId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler: SharedTextHandler = Arc::new(move |content: &str| {
            counter.fetch_add(content.len(), Ordering::SeqCst);
            Some(PartitionOffset::new(PartitionId(0), Offset(0)))
        });

        assert!(handler.on_text_message("hello").is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
