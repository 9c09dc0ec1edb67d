#![forbid(unsafe_code)]

//! Wrapper factory that records every lifecycle call into a shared journal.
//!
//! Each wrapper gets a unique instance id at creation, so tests can tell a
//! rebound wrapper from a recreated one.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use tilehook_core::{
    HostRef, TileEvent, TileEventListener, TileWrapper, WrapperContext, WrapperError,
    WrapperFactory, WrapperKind,
};

/// One recorded lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapperEvent {
    Created { key: String, kind: WrapperKind, id: u64 },
    /// `fresh_item` is set when the host handed over a new item object.
    Rebound { key: String, id: u64, fresh_item: bool },
    LayoutUpdated { key: String, id: u64 },
    Destroyed { key: String, id: u64 },
    Notified { key: String, event: TileEvent },
}

impl WrapperEvent {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Created { key, .. }
            | Self::Rebound { key, .. }
            | Self::LayoutUpdated { key, .. }
            | Self::Destroyed { key, .. }
            | Self::Notified { key, .. } => key,
        }
    }
}

/// Shared, append-only log of wrapper events.
#[derive(Debug, Default)]
pub struct Journal {
    events: RefCell<Vec<WrapperEvent>>,
}

impl Journal {
    fn push(&self, event: WrapperEvent) {
        self.events.borrow_mut().push(event);
    }

    #[must_use]
    pub fn events(&self) -> Vec<WrapperEvent> {
        self.events.borrow().clone()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<WrapperEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    #[must_use]
    pub fn count(&self, pred: impl Fn(&WrapperEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| pred(e)).count()
    }

    #[must_use]
    pub fn created(&self, key: &str) -> usize {
        self.count(|e| matches!(e, WrapperEvent::Created { key: k, .. } if k == key))
    }

    #[must_use]
    pub fn destroyed(&self, key: &str) -> usize {
        self.count(|e| matches!(e, WrapperEvent::Destroyed { key: k, .. } if k == key))
    }

    #[must_use]
    pub fn rebound(&self, key: &str) -> usize {
        self.count(|e| matches!(e, WrapperEvent::Rebound { key: k, .. } if k == key))
    }

    #[must_use]
    pub fn layout_updates(&self, key: &str) -> usize {
        self.count(|e| matches!(e, WrapperEvent::LayoutUpdated { key: k, .. } if k == key))
    }

    /// Instance id of the most recent wrapper created for `key`.
    #[must_use]
    pub fn instance(&self, key: &str) -> Option<u64> {
        self.events.borrow().iter().rev().find_map(|e| match e {
            WrapperEvent::Created { key: k, id, .. } if k == key => Some(*id),
            _ => None,
        })
    }

    /// Instance ids seen rebinding `key`.
    #[must_use]
    pub fn rebound_instances(&self, key: &str) -> Vec<u64> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                WrapperEvent::Rebound { key: k, id, .. } if k == key => Some(*id),
                _ => None,
            })
            .collect()
    }
}

/// Configurable recording factory.
#[derive(Debug)]
pub struct RecordingFactory {
    journal: Rc<Journal>,
    next_id: Cell<u64>,
    /// Extension keys the factory knows; `None` accepts every extension key.
    supported: Option<HashSet<String>>,
    fail_create: HashSet<String>,
    panic_create: HashSet<String>,
    fail_rebind: HashSet<String>,
    subscribe: bool,
}

impl RecordingFactory {
    #[must_use]
    pub fn new(journal: Rc<Journal>) -> Self {
        Self {
            journal,
            next_id: Cell::new(1),
            supported: None,
            fail_create: HashSet::new(),
            panic_create: HashSet::new(),
            fail_rebind: HashSet::new(),
            subscribe: false,
        }
    }

    /// Only the listed extension keys are supported; others are declined.
    #[must_use]
    pub fn supporting<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn failing_create(mut self, key: &str) -> Self {
        self.fail_create.insert(key.to_string());
        self
    }

    #[must_use]
    pub fn panicking_create(mut self, key: &str) -> Self {
        self.panic_create.insert(key.to_string());
        self
    }

    #[must_use]
    pub fn failing_rebind(mut self, key: &str) -> Self {
        self.fail_rebind.insert(key.to_string());
        self
    }

    /// Subscribe every created wrapper to the tile event distributor.
    #[must_use]
    pub fn subscribing(mut self) -> Self {
        self.subscribe = true;
        self
    }

    fn build(
        &self,
        ctx: &WrapperContext<'_>,
        kind: WrapperKind,
    ) -> Result<Box<dyn TileWrapper>, WrapperError> {
        if self.panic_create.contains(ctx.key) {
            panic!("factory panicked for {}", ctx.key);
        }
        if self.fail_create.contains(ctx.key) {
            return Err(WrapperError::Construct {
                key: ctx.key.to_string(),
                message: "injected failure".into(),
            });
        }
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.journal.push(WrapperEvent::Created {
            key: ctx.key.to_string(),
            kind,
            id,
        });
        if self.subscribe {
            ctx.events.subscribe(
                ctx.key,
                Rc::new(Listener {
                    key: ctx.key.to_string(),
                    journal: Rc::clone(&self.journal),
                }),
            );
        }
        Ok(Box::new(RecordingWrapper {
            key: ctx.key.to_string(),
            id,
            item: ctx.item.clone(),
            journal: Rc::clone(&self.journal),
            fail_rebind: self.fail_rebind.contains(ctx.key),
        }))
    }
}

impl WrapperFactory for RecordingFactory {
    fn create_extension(
        &self,
        ctx: &WrapperContext<'_>,
    ) -> Result<Option<Box<dyn TileWrapper>>, WrapperError> {
        if self
            .supported
            .as_ref()
            .is_some_and(|supported| !supported.contains(ctx.key))
        {
            return Ok(None);
        }
        self.build(ctx, WrapperKind::Extension).map(Some)
    }

    fn create_host(&self, ctx: &WrapperContext<'_>) -> Result<Box<dyn TileWrapper>, WrapperError> {
        self.build(ctx, WrapperKind::Host)
    }
}

struct RecordingWrapper {
    key: String,
    id: u64,
    item: HostRef,
    journal: Rc<Journal>,
    fail_rebind: bool,
}

impl TileWrapper for RecordingWrapper {
    fn key(&self) -> &str {
        &self.key
    }

    fn set_live_item(&mut self, item: HostRef) -> Result<(), WrapperError> {
        if self.fail_rebind {
            return Err(WrapperError::Update {
                key: self.key.clone(),
                message: "injected failure".into(),
            });
        }
        let fresh_item = !self.item.same(&item);
        self.item = item;
        self.journal.push(WrapperEvent::Rebound {
            key: self.key.clone(),
            id: self.id,
            fresh_item,
        });
        Ok(())
    }

    fn layout_update(&mut self) -> Result<(), WrapperError> {
        self.journal.push(WrapperEvent::LayoutUpdated {
            key: self.key.clone(),
            id: self.id,
        });
        Ok(())
    }

    fn destroy(&mut self) {
        self.journal.push(WrapperEvent::Destroyed {
            key: self.key.clone(),
            id: self.id,
        });
    }
}

struct Listener {
    key: String,
    journal: Rc<Journal>,
}

impl TileEventListener for Listener {
    fn on_tile_event(&self, event: &TileEvent) {
        self.journal.push(WrapperEvent::Notified {
            key: self.key.clone(),
            event: event.clone(),
        });
    }
}
