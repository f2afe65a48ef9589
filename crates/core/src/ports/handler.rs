//! Port trait for downstream event handlers.
//!
//! This is the main extensibility point of the listener. Every normalized
//! event is passed through an ordered [`HandlerChain`]; each handler sees
//! the output of the previous one.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::HandlerResult;
use crate::models::CWEvent;

/// Trait for consumers of normalized events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name, used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Process one event.
    ///
    /// `previous` is the result of the handler that ran before this one
    /// for the same event (`None` for the first handler).
    async fn handle(
        &self,
        event: &CWEvent,
        previous: Option<serde_json::Value>,
    ) -> HandlerResult<Option<serde_json::Value>>;
}

/// Ordered list of handlers.
#[derive(Clone, Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler; handlers run in registration order.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Builder form of [`HandlerChain::register`].
    pub fn with(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn all(&self) -> &[Arc<dyn EventHandler>] {
        &self.handlers
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl EventHandler for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn handle(
            &self,
            _: &CWEvent,
            previous: Option<serde_json::Value>,
        ) -> HandlerResult<Option<serde_json::Value>> {
            Ok(previous)
        }
    }

    // Handlers keep registration order
    #[test]
    fn test_handler_chain_preserves_order() {
        let chain = HandlerChain::new()
            .with(Arc::new(Named("storage")))
            .with(Arc::new(Named("notify")))
            .with(Arc::new(Named("webhook")));

        let names: Vec<_> = chain.all().iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["storage", "notify", "webhook"]);
        assert_eq!(format!("{chain:?}"), r#"["storage", "notify", "webhook"]"#);
    }
}
