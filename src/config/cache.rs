use crate::api::config::{ChangeKind, ConfigChangeListenFn, ListenerHandle};
use crate::common::remote::WatchItem;
use crate::config::target::WatchTarget;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Tracked state of one watched config.
pub(crate) struct WatchState {
    /// Tells apart successive trackings of the same target, so events of a
    /// dropped tracking never reach a later one.
    pub(crate) generation: u64,
    /// md5 of the last content seen, `""` if never fetched or absent.
    pub(crate) last_digest: String,
    /// The last content seen, reported again in DELETED events.
    pub(crate) last_content: Option<String>,
    /// Bumped on every digest transition within this generation.
    pub(crate) version: u64,
    /// Highest version already handed to listeners.
    pub(crate) delivered_version: u64,
    /// who listen of config change.
    pub(crate) listeners: Vec<(u64, Arc<ConfigChangeListenFn>)>,
}

impl WatchState {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            last_digest: String::new(),
            last_content: None,
            version: 0,
            delivered_version: 0,
            listeners: Vec::new(),
        }
    }
}

/// Position of one event in the delivery order of its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DeliveryStamp {
    pub(crate) generation: u64,
    pub(crate) version: u64,
}

/// A digest change accepted by [`WatchRegistry::update_digest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DigestTransition {
    pub(crate) kind: ChangeKind,
    pub(crate) content: String,
    pub(crate) stamp: DeliveryStamp,
}

/// Shared map of watched configs.
///
/// A target is present exactly while it has at least one listener; every
/// operation holds the lock only for the map access itself.
pub(crate) struct WatchRegistry {
    cache_data_map: RwLock<HashMap<WatchTarget, WatchState>>,
    next_listener_id: AtomicU64,
    next_generation: AtomicU64,
    target_added: Notify,
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchRegistry {
    pub(crate) fn new() -> Self {
        Self {
            cache_data_map: RwLock::new(HashMap::new()),
            next_listener_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
            target_added: Notify::new(),
        }
    }

    /// Add a listener, tracking `target` if it was not tracked yet.
    pub(crate) fn register(
        &self,
        target: WatchTarget,
        listener: Arc<ConfigChangeListenFn>,
    ) -> ListenerHandle {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let newly_tracked = {
            let mut map = self.cache_data_map.write();
            let mut newly_tracked = false;
            let state = map.entry(target.clone()).or_insert_with(|| {
                newly_tracked = true;
                WatchState::new(self.next_generation.fetch_add(1, Ordering::Relaxed))
            });
            state.listeners.push((id, listener));
            newly_tracked
        };
        if newly_tracked {
            tracing::debug!(group_key = %target, "start tracking config");
            self.target_added.notify_one();
        }
        ListenerHandle::new(target, id)
    }

    /// Remove exactly the listener behind `handle`. The target stops being
    /// tracked when its last listener goes away.
    pub(crate) fn unregister(&self, handle: &ListenerHandle) -> bool {
        let mut map = self.cache_data_map.write();
        let Some(state) = map.get_mut(handle.target()) else {
            return false;
        };
        let Some(pos) = state.listeners.iter().position(|(id, _)| *id == handle.id()) else {
            return false;
        };
        state.listeners.swap_remove(pos);
        if state.listeners.is_empty() {
            map.remove(handle.target());
            tracing::debug!(group_key = %handle.target(), "stop tracking config");
        }
        true
    }

    /// Consistent copy of every tracked target and its digest.
    pub(crate) fn snapshot(&self) -> Vec<WatchItem> {
        let map = self.cache_data_map.read();
        let mut items: Vec<WatchItem> = map
            .iter()
            .map(|(target, state)| WatchItem {
                target: target.clone(),
                digest: state.last_digest.clone(),
            })
            .collect();
        items.sort_by(|a, b| a.target.cmp(&b.target));
        items
    }

    /// Record a freshly fetched digest (`""` with `None` content when the
    /// config is absent).
    ///
    /// Returns the transition to report, or `None` when the digest did not
    /// change or the target is no longer tracked.
    pub(crate) fn update_digest(
        &self,
        target: &WatchTarget,
        digest: String,
        content: Option<String>,
    ) -> Option<DigestTransition> {
        let mut map = self.cache_data_map.write();
        let state = map.get_mut(target)?;
        if state.last_digest == digest {
            return None;
        }
        let kind = match (state.last_digest.is_empty(), digest.is_empty()) {
            (true, false) => ChangeKind::Created,
            (false, false) => ChangeKind::Modified,
            (false, true) => ChangeKind::Deleted,
            (true, true) => return None,
        };
        let content = match kind {
            ChangeKind::Deleted => state.last_content.take().unwrap_or_default(),
            _ => content.unwrap_or_default(),
        };
        state.last_digest = digest;
        state.last_content = content_for_state(kind, &content);
        state.version += 1;
        Some(DigestTransition {
            kind,
            content,
            stamp: DeliveryStamp {
                generation: state.generation,
                version: state.version,
            },
        })
    }

    /// The digest currently recorded for `target`.
    #[cfg(test)]
    pub(crate) fn last_digest(&self, target: &WatchTarget) -> Option<String> {
        self.cache_data_map
            .read()
            .get(target)
            .map(|state| state.last_digest.clone())
    }

    /// Listeners registered for `target` right now.
    pub(crate) fn listeners_for(&self, target: &WatchTarget) -> Vec<Arc<ConfigChangeListenFn>> {
        self.cache_data_map
            .read()
            .get(target)
            .map(|state| state.listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    /// Mark the event behind `stamp` as delivered. `false` when the target is
    /// gone, was re-tracked since the event was produced, or a newer event for
    /// it was already delivered.
    pub(crate) fn claim_delivery(&self, target: &WatchTarget, stamp: DeliveryStamp) -> bool {
        let mut map = self.cache_data_map.write();
        match map.get_mut(target) {
            Some(state)
                if state.generation == stamp.generation
                    && stamp.version > state.delivered_version =>
            {
                state.delivered_version = stamp.version;
                true
            }
            _ => false,
        }
    }

    /// Stamp of the `version`-th transition of the current tracking of `target`.
    #[cfg(test)]
    pub(crate) fn stamp(&self, target: &WatchTarget, version: u64) -> DeliveryStamp {
        let generation = self
            .cache_data_map
            .read()
            .get(target)
            .map(|state| state.generation)
            .unwrap_or_default();
        DeliveryStamp {
            generation,
            version,
        }
    }

    pub(crate) fn contains(&self, target: &WatchTarget) -> bool {
        self.cache_data_map.read().contains_key(target)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cache_data_map.read().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.cache_data_map.read().is_empty()
    }

    /// Resolves once a target that was not tracked before gets registered.
    /// A registration that happens while nobody waits is remembered.
    pub(crate) async fn target_added(&self) {
        self.target_added.notified().await
    }
}

fn content_for_state(kind: ChangeKind, content: &str) -> Option<String> {
    match kind {
        ChangeKind::Deleted => None,
        _ => Some(content.to_string()),
    }
}
