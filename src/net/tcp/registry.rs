use std::collections::HashMap;

use crate::error::Result;
use crate::net::tcp::traits::ConnectionId;
use crate::stream::StreamHandle;

/// Maps connection identifiers to the handles of accepted streams.
///
/// Identifiers come from a counter starting at 0 and are never handed out
/// twice. The registry only references handles; the event loop owns them.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, StreamHandle>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next identifier, binds a stream to it through `bind` and
    /// stores the pair. The identifier is consumed only when `bind` succeeds.
    pub fn accept<F>(&mut self, bind: F) -> Result<ConnectionId>
    where
        F: FnOnce(ConnectionId) -> Result<StreamHandle>,
    {
        let id = ConnectionId(self.next_id);
        let handle = bind(id)?;
        self.next_id += 1;
        self.connections.insert(id, handle);
        Ok(id)
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<StreamHandle> {
        self.connections.get(&id).cloned()
    }

    /// Removing an absent identifier is a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> Option<StreamHandle> {
        self.connections.remove(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Registered identifiers in ascending order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Empties the registry. The counter keeps running.
    pub fn drain(&mut self) -> Vec<(ConnectionId, StreamHandle)> {
        let mut all: Vec<_> = self.connections.drain().collect();
        all.sort_unstable_by_key(|(id, _)| *id);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::errors::NetworkError;

    fn accept_detached(registry: &mut ConnectionRegistry) -> ConnectionId {
        registry
            .accept(|id| Ok(StreamHandle::detached(id.as_u64() as usize, Some(id))))
            .unwrap()
    }

    #[test]
    fn identifiers_are_sequential_from_zero() {
        let mut registry = ConnectionRegistry::new();
        let ids: Vec<_> = (0..4).map(|_| accept_detached(&mut registry)).collect();
        assert_eq!(ids, vec![ConnectionId(0), ConnectionId(1), ConnectionId(2), ConnectionId(3)]);
        assert_eq!(registry.ids(), ids);
    }

    #[test]
    fn removal_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let a = accept_detached(&mut registry);
        let b = accept_detached(&mut registry);

        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());
        assert!(registry.remove(ConnectionId(42)).is_none());
        assert_eq!(registry.ids(), vec![b]);
        assert!(registry.lookup(a).is_none());
    }

    #[test]
    fn failed_bind_consumes_no_identifier() {
        let mut registry = ConnectionRegistry::new();
        let failed = registry.accept(|_| Err(NetworkError::StreamClosed));
        assert!(failed.is_err());
        assert!(registry.is_empty());
        assert_eq!(accept_detached(&mut registry), ConnectionId(0));
    }

    #[test]
    fn identifiers_not_reused_after_drain() {
        let mut registry = ConnectionRegistry::new();
        accept_detached(&mut registry);
        accept_detached(&mut registry);

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, ConnectionId(0));
        assert!(registry.is_empty());
        assert_eq!(accept_detached(&mut registry), ConnectionId(2));
    }
}
