#![forbid(unsafe_code)]

//! Wrapper registry: one locally owned wrapper per tile the host shows.
//!
//! # Reconciliation
//!
//! [`ExtensionRegistry::reconcile`] brings the registry into agreement with
//! the collection the host is about to display:
//!
//! 1. Keys no longer present are destroyed (wrapper `destroy()` runs, its
//!    event subscription is dropped, then the mapping is removed).
//! 2. Keys already mapped rebind their wrapper to the new live item. The
//!    host may recreate item objects under a stable key, so wrappers are
//!    rebound, never recreated.
//! 3. New keys get a wrapper. Keys inside this system's namespace go to the
//!    extension factory, which may decline (the key then stays unmapped);
//!    every other key gets a host wrapper.
//!
//! # Invariants
//!
//! 1. At most one wrapper per key.
//! 2. After `reconcile`, the key set equals the incoming keys minus keys
//!    whose wrapper was declined or failed to construct.
//! 3. A wrapper is destroyed exactly once, before its key is dropped.
//!
//! # Failure Modes
//!
//! A wrapper that fails (or panics) while being constructed or rebound is
//! logged and isolated: construction failures leave the key unmapped, rebind
//! failures keep the previous wrapper. The rest of the pass continues.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::{PanelConfig, PreferenceSnapshot};
use crate::error::{Error, WrapperError};
use crate::events::TileEventDistributor;
use crate::host::HostRef;
use crate::intercept::isolate;

/// Lifecycle contract every tile wrapper implements.
pub trait TileWrapper {
    /// Stable tile key this wrapper represents.
    fn key(&self) -> &str;

    /// Rebind to the host's current item object for this key.
    fn set_live_item(&mut self, item: HostRef) -> Result<(), WrapperError>;

    /// React to a panel geometry change.
    fn layout_update(&mut self) -> Result<(), WrapperError>;

    /// Release everything the wrapper holds on the host side.
    fn destroy(&mut self);
}

/// Which factory produced a wrapper. Resolved once, at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperKind {
    /// A tile from this system's own namespace.
    Extension,
    /// A stock host tile.
    Host,
}

/// Everything a factory gets to build a wrapper.
#[derive(Debug, Clone, Copy)]
pub struct WrapperContext<'a> {
    /// The host's tile host object.
    pub host: &'a HostRef,
    pub key: &'a str,
    pub item: &'a HostRef,
    pub config: &'a PanelConfig,
    pub prefs: &'a PreferenceSnapshot,
    pub events: &'a TileEventDistributor,
}

/// Produces wrappers for newly seen keys.
pub trait WrapperFactory {
    /// Build a wrapper for one of this system's own tiles. `Ok(None)` means
    /// the sub-type is not supported; the key is then left unmapped.
    fn create_extension(
        &self,
        ctx: &WrapperContext<'_>,
    ) -> Result<Option<Box<dyn TileWrapper>>, WrapperError>;

    /// Build a wrapper for a stock host tile.
    fn create_host(&self, ctx: &WrapperContext<'_>) -> Result<Box<dyn TileWrapper>, WrapperError>;
}

/// Classifies keys as extension or host tiles by namespace substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileNamespace(String);

impl TileNamespace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self(namespace.into())
    }

    #[must_use]
    pub fn classify(&self, key: &str) -> WrapperKind {
        if key.contains(self.0.as_str()) {
            WrapperKind::Extension
        } else {
            WrapperKind::Host
        }
    }
}

struct Entry {
    kind: WrapperKind,
    wrapper: Box<dyn TileWrapper>,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub destroyed: Vec<String>,
    pub created: Vec<String>,
    pub rebound: Vec<String>,
    /// Extension keys the factory declined.
    pub declined: Vec<String>,
    /// Keys whose wrapper failed to construct or rebind.
    pub failed: Vec<String>,
}

/// Key → wrapper map with create/update/destroy reconciliation.
pub struct ExtensionRegistry {
    namespace: TileNamespace,
    entries: FxHashMap<String, Entry>,
}

impl ExtensionRegistry {
    pub fn new(namespace: TileNamespace) -> Self {
        Self {
            namespace,
            entries: FxHashMap::default(),
        }
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
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn kind_of(&self, key: &str) -> Option<WrapperKind> {
        self.entries.get(key).map(|e| e.kind)
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Reconcile against the host's incoming collection.
    pub fn reconcile(
        &mut self,
        items: &[(String, HostRef)],
        factory: &dyn WrapperFactory,
        host: &HostRef,
        config: &PanelConfig,
        prefs: &PreferenceSnapshot,
        events: &TileEventDistributor,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let incoming: FxHashSet<&str> = items.iter().map(|(k, _)| k.as_str()).collect();
        let removed: Vec<String> = self
            .entries
            .keys()
            .filter(|k| !incoming.contains(k.as_str()))
            .cloned()
            .collect();
        for key in removed {
            if let Some(mut entry) = self.entries.remove(&key) {
                if let Err(err) = isolate(|| {
                    entry.wrapper.destroy();
                    Ok(())
                }) {
                    tracing::error!(
                        target: "tilehook.registry",
                        key = %key,
                        operation = "destroy",
                        error = %err,
                        "wrapper destroy failed"
                    );
                }
                events.unsubscribe(&key);
                tracing::debug!(target: "tilehook.registry", key = %key, "destroyed wrapper");
                report.destroyed.push(key);
            }
        }

        for (key, item) in items {
            if let Some(entry) = self.entries.get_mut(key) {
                match isolate(|| Ok(entry.wrapper.set_live_item(item.clone())?)) {
                    Ok(()) => {
                        tracing::trace!(target: "tilehook.registry", key = %key, "rebound wrapper");
                        report.rebound.push(key.clone());
                    }
                    Err(err) => {
                        tracing::error!(
                            target: "tilehook.registry",
                            key = %key,
                            operation = "set_live_item",
                            error = %err,
                            "wrapper rebind failed; keeping previous binding"
                        );
                        report.failed.push(key.clone());
                    }
                }
                continue;
            }

            let kind = self.namespace.classify(key);
            let ctx = WrapperContext {
                host,
                key,
                item,
                config,
                prefs,
                events,
            };
            let created: Result<Option<Box<dyn TileWrapper>>, Error> = isolate(|| match kind {
                WrapperKind::Extension => Ok(factory.create_extension(&ctx)?),
                WrapperKind::Host => Ok(Some(factory.create_host(&ctx)?)),
            });
            match created {
                Ok(Some(wrapper)) => {
                    tracing::debug!(
                        target: "tilehook.registry",
                        key = %key,
                        kind = ?kind,
                        "created wrapper"
                    );
                    self.entries.insert(key.clone(), Entry { kind, wrapper });
                    report.created.push(key.clone());
                }
                Ok(None) => {
                    tracing::debug!(
                        target: "tilehook.registry",
                        key = %key,
                        "extension tile not supported; leaving unmapped"
                    );
                    report.declined.push(key.clone());
                }
                Err(err) => {
                    tracing::error!(
                        target: "tilehook.registry",
                        key = %key,
                        operation = "create",
                        error = %err,
                        "wrapper construction failed"
                    );
                    report.failed.push(key.clone());
                }
            }
        }

        report
    }

    /// Ask the wrapper for `key` to refresh its layout. Unmapped keys are a
    /// no-op; returns whether a wrapper was found.
    pub fn layout_update(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if let Err(err) = isolate(|| Ok(entry.wrapper.layout_update()?)) {
            tracing::error!(
                target: "tilehook.registry",
                key = %key,
                operation = "layout_update",
                error = %err,
                "wrapper layout update failed"
            );
        }
        true
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("namespace", &self.namespace)
            .field("keys", &self.keys())
            .finish()
    }
}
