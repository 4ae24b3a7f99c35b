//! Routes decoded job events to handlers by (domain, action).

use super::handler::{EventHandler, Handler};
use crate::error::{Error, Result};
use crate::model::{JobEvent, Message};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type Route = (String, Option<String>);

/// [`Handler`] that decodes each payload as a [`JobEvent`] and forwards it.
///
/// Lookup order: the handler registered for the exact (domain, action), then
/// the one registered for the domain alone. No match is an
/// [`Error::Unroutable`] handler failure.
#[derive(Default, Clone)]
pub struct Dispatcher {
    routes: HashMap<Route, Arc<dyn EventHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `domain`, narrowed to `action` if given.
    /// Replaces any handler already registered for the same route.
    pub fn register(
        &mut self,
        domain: impl Into<String>,
        action: Option<&str>,
        handler: Arc<dyn EventHandler>,
    ) -> &mut Self {
        self.routes
            .insert((domain.into(), action.map(str::to_string)), handler);
        self
    }

    pub fn route(&self, domain: &str, action: Option<&str>) -> Option<&Arc<dyn EventHandler>> {
        let exact = action.and_then(|a| {
            self.routes
                .get(&(domain.to_string(), Some(a.to_string())))
        });
        exact.or_else(|| self.routes.get(&(domain.to_string(), None)))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl Handler for Dispatcher {
    async fn handle_job(&self, message: &Message) -> Result<()> {
        let event = JobEvent::decode(message)?;
        let handler = self
            .route(&event.domain, event.action.as_deref())
            .ok_or_else(|| Error::Unroutable {
                domain: event.domain.clone(),
                action: event.action.clone(),
            })?;
        debug!(
            domain = %event.domain,
            action = event.action.as_deref().unwrap_or("-"),
            entity_id = %event.entity_id,
            "dispatching event"
        );
        handler.handle_event(&event, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records which registration saw each event.
    struct Named(&'static str, Arc<Mutex<Vec<&'static str>>>);

    #[async_trait]
    impl EventHandler for Named {
        async fn handle_event(&self, _: &JobEvent, _: &Message) -> Result<()> {
            self.1.lock().unwrap().push(self.0);
            Ok(())
        }
    }

    fn dispatcher(seen: &Arc<Mutex<Vec<&'static str>>>) -> Dispatcher {
        let mut d = Dispatcher::new();
        d.register("team", Some("sync"), Arc::new(Named("team/sync", seen.clone())))
            .register("team", None, Arc::new(Named("team/*", seen.clone())));
        d
    }

    fn message(event: &JobEvent) -> Message {
        Message::new("1", "1", serde_json::to_vec(event).unwrap())
    }

    #[tokio::test]
    async fn exact_match_wins_over_domain_fallback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let d = dispatcher(&seen);

        let sync = JobEvent::new("team", "t-1").action("sync");
        let delete = JobEvent::new("team", "t-1").action("delete");
        let bare = JobEvent::new("team", "t-1");
        for event in [&sync, &delete, &bare] {
            d.handle_job(&message(event)).await.unwrap();
        }

        assert_eq!(*seen.lock().unwrap(), vec!["team/sync", "team/*", "team/*"]);
    }

    #[tokio::test]
    async fn unknown_domain_is_unroutable() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let d = dispatcher(&seen);

        let err = d
            .handle_job(&message(&JobEvent::new("billing", "org-1").action("charge")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Unroutable { ref domain, action: Some(ref a) } if domain == "billing" && a == "charge"
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn action_only_registration_does_not_catch_bare_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut d = Dispatcher::new();
        d.register("billing", Some("charge"), Arc::new(Named("charge", seen)));
        assert!(d.route("billing", None).is_none());
        assert!(d.route("billing", Some("refund")).is_none());
        assert!(d.route("billing", Some("charge")).is_some());
    }
}
