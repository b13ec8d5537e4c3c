// frontend/src/scope.rs

use crate::manager::ConnectionManager;
use crate::projection::{RetainPolicy, UnitProjection};
use tracing::debug;

/// Mount-time handle a dashboard section holds while it cares about the feed.
///
/// Entering with `should_connect` starts the configured connection if it is
/// not already up; entering without it closes the connection deliberately.
/// Dropping the scope leaves the connection alone so it survives navigation.
pub struct FeedScope {
    manager: ConnectionManager,
    should_connect: bool,
}

impl FeedScope {
    pub fn enter(manager: &ConnectionManager, should_connect: bool) -> Self {
        let scope = Self {
            manager: manager.clone(),
            should_connect,
        };
        scope.apply();
        scope
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn should_connect(&self) -> bool {
        self.should_connect
    }

    /// Re-evaluate after the owner's `should_connect` input changed.
    pub fn set_should_connect(&mut self, should_connect: bool) {
        if self.should_connect != should_connect {
            self.should_connect = should_connect;
            self.apply();
        }
    }

    pub fn unit(&self, unit_id: impl Into<String>) -> UnitProjection {
        UnitProjection::new(&self.manager, unit_id)
    }

    pub fn unit_with(&self, unit_id: impl Into<String>, policy: RetainPolicy) -> UnitProjection {
        UnitProjection::with_policy(&self.manager, unit_id, policy)
    }

    fn apply(&self) {
        if self.should_connect {
            if !self.manager.is_connected() {
                self.manager.start();
            }
        } else {
            self.manager.close(true);
        }
    }
}

impl Drop for FeedScope {
    fn drop(&mut self) {
        debug!(state = %self.manager.state(), "feed scope left; connection kept");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use crate::error::FeedError;
    use crate::manager::ConnectionState;
    use crate::testing::{FakeTransport, ManualScheduler, Recorder};

    fn manager(endpoint: Option<&str>) -> (ConnectionManager, std::sync::Arc<FakeTransport>) {
        let transport = FakeTransport::new();
        let mut config = FeedConfig::default();
        if let Some(ep) = endpoint {
            config = config.with_endpoint(ep);
        }
        let mgr = ConnectionManager::new(config, transport.clone(), ManualScheduler::new());
        (mgr, transport)
    }

    #[test]
    fn nested_scopes_share_one_connection() {
        let (mgr, transport) = manager(Some("ws://feed.test/ws"));
        let outer = FeedScope::enter(&mgr, true);
        transport.accept(0);
        let inner = FeedScope::enter(&mgr, true);

        assert_eq!(transport.opened(), 1);
        drop(inner);
        drop(outer);
        assert!(mgr.is_connected());
    }

    #[test]
    fn disabled_scope_closes_deliberately() {
        let (mgr, transport) = manager(Some("ws://feed.test/ws"));
        let mut scope = FeedScope::enter(&mgr, true);
        transport.accept(0);

        scope.set_should_connect(false);
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(!mgr.retry_pending());
        assert!(transport.is_closed(0));

        scope.set_should_connect(true);
        assert_eq!(transport.opened(), 2);
    }

    #[test]
    fn missing_endpoint_is_reported_not_raised() {
        let (mgr, transport) = manager(None);
        let rec = Recorder::attach(&mgr);
        let _a = FeedScope::enter(&mgr, true);
        let _b = FeedScope::enter(&mgr, true);

        assert_eq!(transport.opened(), 0);
        assert_eq!(rec.errors(), vec![Some(FeedError::MissingEndpoint)]);
    }

    #[test]
    fn scope_hands_out_projections() {
        let (mgr, transport) = manager(Some("ws://feed.test/ws"));
        let scope = FeedScope::enter(&mgr, true);
        let unit = scope.unit("gauge-7");
        transport.accept(0);
        transport.frame(0, r#"{"unit_id":"gauge-7","height":3.25}"#);

        assert_eq!(unit.record().map(|r| r.height), Some(3.25));
        assert!(unit.is_connected());
    }

    #[test]
    fn disabling_the_scope_clears_its_projections() {
        let (mgr, transport) = manager(Some("ws://feed.test/ws"));
        let mut scope = FeedScope::enter(&mgr, true);
        let unit = scope.unit("gauge-7");
        transport.accept(0);
        transport.frame(0, r#"{"unit_id":"gauge-7","height":3.25}"#);
        transport.emit(0, crate::transport::TransportEvent::Error("reset".into()));
        assert!(unit.record().is_some() && unit.error().is_some());

        scope.set_should_connect(false);
        assert_eq!(unit.record(), None);
        assert_eq!(unit.error(), None);
        assert!(!unit.is_connected());
    }
}
