#![forbid(unsafe_code)]

//! Panel orchestration: hook wiring, lifecycle, and configuration events.
//!
//! # Lifecycle
//!
//! ```text
//! Unattached --(panel constructed)--> Attached --(setTiles)--> Synced
//!                                                  ^             |
//!                                                  +--(setTiles)-+
//! ```
//!
//! # Hooks
//!
//! | site                                   | when   | effect                          |
//! |----------------------------------------|--------|---------------------------------|
//! | panel constructors                     | after  | capture panel handle            |
//! | `panel.setTiles(Collection)`           | before | reload prefs, reconcile         |
//! | `panel.updateResources()`              | after  | reapply slider visibility       |
//! | `panel.onTuningChanged(String,String)` | after  | reapply slider visibility       |
//! | `layout.updateResources()`             | after  | geometry override               |
//! | `brightness.updateIcon(boolean)`       | after  | icon handlers and visibility    |
//! | `tileView.handleStateChanged(State)`   | after  | hide padlock (optional)         |
//! | `tileHost.startActivity...(Intent)`    | before | drop admin dialog (optional)    |
//!
//! # Panel handlers
//!
//! Panel-wide behaviors that need the event distributor (quick pulldown and
//! similar) are built by a one-shot [`HandlerFactory`] on the first tile
//! collection, right after the distributor itself. The controller owns the
//! handlers it returns for the rest of its life.
//!
//! # Threading
//!
//! Every entry point (hooks and [`PanelController::on_config_changed`]) must
//! run on the host's UI thread. State lives in a `RefCell`; host calls that
//! can re-enter a hook are made only after the borrow is released, and a
//! re-entrant borrow that slips through is logged as [`Error::Reentrant`]
//! rather than panicking. Configuration events arriving on another thread
//! must be queued onto the UI thread before calling in.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::brightness::{
    self, BrightnessSlider, FIELD_TILE_HOST, PanelHandle, apply_slider_visibility,
};
use crate::config::{ConfigDelta, HostSymbols, PanelConfig, PreferenceSnapshot, PreferenceSource};
use crate::error::{ConfigError, Error, HostError};
use crate::events::{TileEvent, TileEventDistributor};
use crate::host::{HostRef, HostValue};
use crate::intercept::{
    HookSite, InstallReport, Interceptor, MethodHook, MethodHookParam, isolate,
};
use crate::layout::{GeometryFields, LayoutAdjuster};
use crate::registry::{ExtensionRegistry, ReconcileReport, TileNamespace, WrapperFactory};
use crate::restrictions;

/// Panel field holding the current tile records.
pub const FIELD_RECORDS: &str = "mRecords";
/// Record field holding the tile object.
pub const FIELD_RECORD_TILE: &str = "tile";
/// Tile field holding the stable tile key.
pub const FIELD_TILE_SPEC: &str = "mTileSpec";

/// A panel-wide behavior built once the event distributor exists.
pub trait PanelHandler {
    /// Name used in logs.
    fn name(&self) -> &str;
}

/// What a [`HandlerFactory`] gets to build handlers from.
pub struct HandlerContext<'a> {
    pub panel: &'a HostRef,
    pub prefs: &'a PreferenceSnapshot,
    pub distributor: &'a Rc<TileEventDistributor>,
}

/// Builds the panel handlers. Called at most once.
pub type HandlerFactory =
    Box<dyn FnOnce(&HandlerContext<'_>) -> Result<Vec<Box<dyn PanelHandler>>, Error>>;

/// Where the controller is in the panel's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelPhase {
    /// No panel instance seen yet.
    Unattached,
    /// Panel captured; no tile collection seen yet.
    Attached,
    /// At least one tile collection reconciled.
    Synced,
}

struct PanelState {
    phase: PanelPhase,
    config: PanelConfig,
    prefs: PreferenceSnapshot,
    source: Box<dyn PreferenceSource>,
    registry: ExtensionRegistry,
    layout: LayoutAdjuster,
    slider: BrightnessSlider,
    distributor: Option<Rc<TileEventDistributor>>,
    handler_factory: Option<HandlerFactory>,
    handlers: Vec<Box<dyn PanelHandler>>,
    last_reconcile: Option<ReconcileReport>,
}

struct Inner {
    symbols: HostSymbols,
    geometry: GeometryFields,
    panel: PanelHandle,
    factory: Box<dyn WrapperFactory>,
    state: RefCell<PanelState>,
}

/// Orchestrates one host panel. Create one per attached panel.
#[derive(Clone)]
pub struct PanelController {
    inner: Rc<Inner>,
}

impl PanelController {
    /// Build a controller, seeding [`PanelConfig`] from the source's current
    /// snapshot.
    pub fn new(
        symbols: HostSymbols,
        mut source: Box<dyn PreferenceSource>,
        factory: Box<dyn WrapperFactory>,
    ) -> Result<Self, ConfigError> {
        let prefs = source.reload()?;
        let config = PanelConfig::from_snapshot(&prefs)?;
        tracing::debug!(target: "tilehook", ?config, "panel controller created");

        let geometry = GeometryFields::default();
        let namespace = TileNamespace::new(symbols.tile_namespace.clone());
        let state = PanelState {
            phase: PanelPhase::Unattached,
            config,
            prefs,
            source,
            registry: ExtensionRegistry::new(namespace),
            layout: LayoutAdjuster::new(geometry.clone()),
            slider: BrightnessSlider::default(),
            distributor: None,
            handler_factory: None,
            handlers: Vec::new(),
            last_reconcile: None,
        };
        Ok(Self {
            inner: Rc::new(Inner {
                symbols,
                geometry,
                panel: PanelHandle::default(),
                factory,
                state: RefCell::new(state),
            }),
        })
    }

    /// Set the factory that builds panel handlers on the next tile
    /// collection. Replaces a factory that has not run yet.
    pub fn set_handler_factory(&self, factory: HandlerFactory) {
        self.inner.state.borrow_mut().handler_factory = Some(factory);
    }

    /// Register every hook with `interceptor`. Missing host symbols are
    /// recorded in the report and logged; the remaining hooks still install.
    pub fn install(&self, interceptor: &dyn Interceptor) -> InstallReport {
        let symbols = &self.inner.symbols;
        let mut report = InstallReport::default();

        let inner = Rc::clone(&self.inner);
        report.attach(
            interceptor,
            HookSite::constructors(&symbols.panel_type),
            MethodHook::after("panel_constructed", move |p| inner.on_panel_constructed(p)),
            true,
        );

        let inner = Rc::clone(&self.inner);
        report.attach(
            interceptor,
            HookSite::method(&symbols.panel_type, "setTiles", ["java.util.Collection"]),
            MethodHook::before("set_tiles", move |p| inner.on_set_tiles(p)),
            true,
        );

        let inner = Rc::clone(&self.inner);
        report.attach(
            interceptor,
            HookSite::method(&symbols.panel_type, "updateResources", Vec::<String>::new()),
            MethodHook::after("panel_resources", move |p| inner.on_panel_resources(p)),
            true,
        );

        let inner = Rc::clone(&self.inner);
        report.attach(
            interceptor,
            HookSite::method(
                &symbols.panel_type,
                "onTuningChanged",
                ["java.lang.String", "java.lang.String"],
            ),
            MethodHook::after("tuning_changed", move |p| inner.on_tuning_changed(p)),
            true,
        );

        let inner = Rc::clone(&self.inner);
        report.attach(
            interceptor,
            HookSite::method(&symbols.tile_layout_type, "updateResources", Vec::<String>::new()),
            MethodHook::after("layout_resources", move |p| inner.on_layout_resources(p)),
            true,
        );

        let inner = Rc::clone(&self.inner);
        report.attach(
            interceptor,
            HookSite::method(&symbols.brightness_controller_type, "updateIcon", ["boolean"]),
            MethodHook::after("brightness_icon", move |p| inner.on_brightness_icon(p)),
            true,
        );

        report.attach(
            interceptor,
            restrictions::padlock_site(symbols),
            restrictions::padlock_hook(),
            false,
        );
        report.attach(
            interceptor,
            restrictions::admin_dialog_site(symbols),
            restrictions::admin_dialog_hook(symbols),
            false,
        );

        tracing::info!(
            target: "tilehook",
            installed = report.installed.len(),
            failed = report.failed.len(),
            "panel hooks installed"
        );
        report
    }

    /// Apply a configuration-change event.
    ///
    /// Column or correction changes refresh host resources and then ask every
    /// live tile's wrapper to update its layout. A slider change refreshes
    /// resources, which reapplies visibility through the refresh hook.
    pub fn on_config_changed(&self, delta: &ConfigDelta) {
        if let Err(err) = isolate(|| self.inner.apply_config(delta)) {
            tracing::error!(
                target: "tilehook",
                operation = "config_changed",
                error = %err,
                "configuration change failed"
            );
        }
    }

    #[must_use]
    pub fn phase(&self) -> PanelPhase {
        self.inner.state.borrow().phase
    }

    #[must_use]
    pub fn config(&self) -> PanelConfig {
        self.inner.state.borrow().config
    }

    /// Preferences as of the last reload.
    #[must_use]
    pub fn preferences(&self) -> PreferenceSnapshot {
        self.inner.state.borrow().prefs.clone()
    }

    /// The captured host panel, if constructed yet.
    #[must_use]
    pub fn panel(&self) -> Option<HostRef> {
        self.inner.panel.get().cloned()
    }

    /// Keys with a live wrapper, sorted.
    #[must_use]
    pub fn registered_keys(&self) -> Vec<String> {
        self.inner.state.borrow().registry.keys()
    }

    #[must_use]
    pub fn last_reconcile(&self) -> Option<ReconcileReport> {
        self.inner.state.borrow().last_reconcile.clone()
    }

    #[must_use]
    pub fn original_cell_width(&self) -> Option<i32> {
        self.inner.state.borrow().layout.original_cell_width()
    }

    /// Names of the panel handlers built so far.
    #[must_use]
    pub fn handler_names(&self) -> Vec<String> {
        self.inner
            .state
            .borrow()
            .handlers
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    /// The tile event distributor, once the first tile collection arrived.
    #[must_use]
    pub fn distributor(&self) -> Option<Rc<TileEventDistributor>> {
        self.inner.state.borrow().distributor.clone()
    }

    #[must_use]
    pub fn symbols(&self) -> &HostSymbols {
        &self.inner.symbols
    }
}

impl fmt::Debug for PanelController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("PanelController");
        d.field("panel", &self.inner.panel.get());
        if let Ok(state) = self.inner.state.try_borrow() {
            d.field("phase", &state.phase)
                .field("config", &state.config)
                .field("registry", &state.registry);
        }
        d.finish()
    }
}

impl Inner {
    fn with_state<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut PanelState) -> T,
    ) -> Result<T, Error> {
        let mut state = self
            .state
            .try_borrow_mut()
            .map_err(|_| Error::Reentrant { operation })?;
        Ok(f(&mut state))
    }

    fn is_panel_type(&self, obj: &HostRef) -> bool {
        obj.type_name() == self.symbols.panel_type
    }

    fn is_captured_panel(&self, obj: &HostRef) -> bool {
        self.panel.get().is_some_and(|panel| panel.same(obj))
    }

    /// Capture `obj` as the panel if none is captured yet.
    fn adopt_panel(&self, obj: &HostRef) -> Result<(), Error> {
        if self.panel.get().is_some() {
            if !self.is_captured_panel(obj) {
                tracing::debug!(target: "tilehook", "ignoring additional panel instance");
            }
            return Ok(());
        }
        let _ = self.panel.set(obj.clone());
        self.with_state("adopt_panel", |state| {
            if state.phase == PanelPhase::Unattached {
                state.phase = PanelPhase::Attached;
            }
        })?;
        tracing::info!(target: "tilehook", panel = %obj.type_name(), "panel attached");
        Ok(())
    }

    fn on_panel_constructed(&self, param: &mut MethodHookParam<'_>) -> Result<(), Error> {
        // Constructor hooks fire for subclasses too; only the exact type counts.
        if !self.is_panel_type(param.this()) {
            return Ok(());
        }
        self.adopt_panel(param.this())
    }

    fn on_set_tiles(&self, param: &mut MethodHookParam<'_>) -> Result<(), Error> {
        let this = param.this().clone();
        if !self.is_panel_type(&this) {
            return Ok(());
        }
        if self.panel.get().is_none() {
            tracing::warn!(
                target: "tilehook",
                "tile collection set before panel construction was seen; adopting instance"
            );
        }
        self.adopt_panel(&this)?;

        let host = this
            .object_field(FIELD_TILE_HOST)?
            .ok_or_else(|| HostError::Invocation {
                type_name: this.type_name().to_string(),
                method: "setTiles".into(),
                message: "tile host is null".into(),
            })?;
        let tiles = param
            .arg(0)
            .and_then(HostValue::as_list)
            .ok_or_else(|| HostError::Argument {
                method: "setTiles".into(),
                index: 0,
                expected: "list",
            })?;
        let items = keyed_tiles(tiles);

        let (distributor, handler_factory, prefs) = self.with_state("set_tiles", |state| {
            match state.source.reload() {
                Ok(prefs) => state.prefs = prefs,
                Err(err) => tracing::warn!(
                    target: "tilehook",
                    operation = "reload_preferences",
                    error = %err,
                    "keeping previous preference snapshot"
                ),
            }
            let distributor = Rc::clone(state.distributor.get_or_insert_with(|| {
                tracing::debug!(target: "tilehook", "tile event distributor created");
                Rc::new(TileEventDistributor::new(host.clone()))
            }));
            let factory = state.handler_factory.take();
            let prefs = factory.as_ref().map(|_| state.prefs.clone());
            (distributor, factory, prefs)
        })?;

        // Handler construction may call back into the host.
        if let (Some(factory), Some(prefs)) = (handler_factory, prefs) {
            self.build_handlers(factory, &this, &prefs, &distributor)?;
        }

        let report = self.with_state("set_tiles", |state| {
            let report = state.registry.reconcile(
                &items,
                self.factory.as_ref(),
                &host,
                &state.config,
                &state.prefs,
                &distributor,
            );
            state.phase = PanelPhase::Synced;
            state.last_reconcile = Some(report.clone());
            report
        })?;

        tracing::debug!(
            target: "tilehook",
            tiles = items.len(),
            created = report.created.len(),
            destroyed = report.destroyed.len(),
            rebound = report.rebound.len(),
            "tile wrappers reconciled"
        );
        Ok(())
    }

    fn build_handlers(
        &self,
        factory: HandlerFactory,
        panel: &HostRef,
        prefs: &PreferenceSnapshot,
        distributor: &Rc<TileEventDistributor>,
    ) -> Result<(), Error> {
        let ctx = HandlerContext {
            panel,
            prefs,
            distributor,
        };
        match isolate(|| factory(&ctx)) {
            Ok(handlers) => {
                let names: Vec<&str> = handlers.iter().map(|h| h.name()).collect();
                tracing::debug!(target: "tilehook", handlers = ?names, "panel handlers built");
                self.with_state("handlers", |state| state.handlers.extend(handlers))
            }
            Err(err) => {
                tracing::error!(
                    target: "tilehook",
                    operation = "build_handlers",
                    error = %err,
                    "panel handlers unavailable"
                );
                Ok(())
            }
        }
    }

    fn on_panel_resources(&self, param: &mut MethodHookParam<'_>) -> Result<(), Error> {
        if !self.is_captured_panel(param.this()) {
            return Ok(());
        }
        self.refresh_slider(param.this())
    }

    fn on_tuning_changed(&self, param: &mut MethodHookParam<'_>) -> Result<(), Error> {
        if !self.is_captured_panel(param.this()) {
            return Ok(());
        }
        let key = param.arg(0).and_then(HostValue::as_str);
        if key != Some(self.symbols.tuning_brightness_key.as_str()) {
            return Ok(());
        }
        self.refresh_slider(param.this())
    }

    fn refresh_slider(&self, panel: &HostRef) -> Result<(), Error> {
        let (slider, hide) = self.with_state("slider", |state| {
            (
                state.slider.resolve(panel),
                state.config.hide_brightness_slider,
            )
        })?;
        apply_slider_visibility(panel, slider?.as_ref(), hide)?;
        Ok(())
    }

    fn on_layout_resources(&self, param: &mut MethodHookParam<'_>) -> Result<(), Error> {
        let layout = param.this().clone();
        let outcome = self.with_state("layout", |state| {
            let config = state.config;
            state.layout.adjust(&layout, &config)
        })??;
        if outcome.is_override() {
            self.geometry.request_relayout(&layout)?;
            param.set_result(true);
        }
        Ok(())
    }

    fn on_brightness_icon(&self, param: &mut MethodHookParam<'_>) -> Result<(), Error> {
        let enabled = self.with_state("brightness_icon", |state| {
            state.config.brightness_icon_enabled
        })?;
        brightness::update_icon(param.this(), enabled, &self.symbols, &self.panel)?;
        Ok(())
    }

    fn apply_config(&self, delta: &ConfigDelta) -> Result<(), Error> {
        let (change, config, distributor) = self.with_state("config_changed", |state| {
            let change = state.config.apply(delta);
            (change, state.config, state.distributor.clone())
        })?;
        tracing::info!(target: "tilehook", ?delta, ?change, "configuration changed");

        if let Some(panel) = self.panel.get() {
            if change.geometry || change.slider {
                // Re-enters the panel and layout refresh hooks.
                if let Err(err) = panel.call("updateResources", &[]) {
                    tracing::error!(
                        target: "tilehook",
                        operation = "update_resources",
                        error = %err,
                        "resource refresh failed"
                    );
                }
            }
            if change.geometry {
                if let Err(err) = self.update_wrapper_layouts(panel) {
                    tracing::error!(
                        target: "tilehook",
                        operation = "layout_update",
                        error = %err,
                        "wrapper layout updates skipped"
                    );
                }
            }
        } else if change.any() {
            tracing::debug!(target: "tilehook", "panel not attached; change stored only");
        }

        if let Some(distributor) = distributor {
            distributor.dispatch(&TileEvent::ConfigChanged {
                delta: *delta,
                config,
            });
        }
        Ok(())
    }

    /// Second phase of a geometry change: each live tile's wrapper reacts.
    fn update_wrapper_layouts(&self, panel: &HostRef) -> Result<(), Error> {
        let mut keys = Vec::new();
        for record in panel.list_field(FIELD_RECORDS)? {
            let Some(record) = record.as_object() else {
                continue;
            };
            match record_key(record) {
                Ok(key) => keys.push(key),
                Err(err) => tracing::warn!(
                    target: "tilehook",
                    operation = "record_key",
                    error = %err,
                    "skipping tile record"
                ),
            }
        }
        self.with_state("layout_update", |state| {
            for key in &keys {
                if state.registry.layout_update(key) {
                    tracing::trace!(target: "tilehook", key = %key, "wrapper layout updated");
                }
            }
        })
    }
}

fn record_key(record: &HostRef) -> Result<String, HostError> {
    let tile = record
        .object_field(FIELD_RECORD_TILE)?
        .ok_or_else(|| HostError::MissingField {
            type_name: record.type_name().to_string(),
            field: FIELD_RECORD_TILE.into(),
        })?;
    tile.str_field(FIELD_TILE_SPEC)
}

/// Pair each incoming tile with its key. Tiles without a readable key are
/// logged and left out.
fn keyed_tiles(tiles: &[HostValue]) -> Vec<(String, HostRef)> {
    let mut items = Vec::with_capacity(tiles.len());
    for (index, value) in tiles.iter().enumerate() {
        let Some(tile) = value.as_object() else {
            tracing::warn!(target: "tilehook", index, kind = value.kind(), "non-object tile skipped");
            continue;
        };
        match tile.str_field(FIELD_TILE_SPEC) {
            Ok(key) => items.push((key, tile.clone())),
            Err(err) => tracing::warn!(
                target: "tilehook",
                index,
                operation = "tile_key",
                error = %err,
                "tile without key skipped"
            ),
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticPreferences;
    use crate::error::WrapperError;
    use crate::events::TileEventListener;
    use std::cell::Cell;
    use crate::registry::{TileWrapper, WrapperContext};
    use crate::test_support::FieldBag;

    struct NoopFactory;

    struct Noop(String);

    impl TileWrapper for Noop {
        fn key(&self) -> &str {
            &self.0
        }
        fn set_live_item(&mut self, _item: HostRef) -> Result<(), WrapperError> {
            Ok(())
        }
        fn layout_update(&mut self) -> Result<(), WrapperError> {
            Ok(())
        }
        fn destroy(&mut self) {}
    }

    impl WrapperFactory for NoopFactory {
        fn create_extension(
            &self,
            _ctx: &WrapperContext<'_>,
        ) -> Result<Option<Box<dyn TileWrapper>>, WrapperError> {
            Ok(None)
        }
        fn create_host(&self, ctx: &WrapperContext<'_>) -> Result<Box<dyn TileWrapper>, WrapperError> {
            Ok(Box::new(Noop(ctx.key.to_string())))
        }
    }

    fn controller() -> PanelController {
        PanelController::new(
            HostSymbols::default(),
            Box::new(StaticPreferences::default()),
            Box::new(NoopFactory),
        )
        .unwrap()
    }

    fn tile(key: &str) -> HostValue {
        HostValue::Object(FieldBag::new("QSTile").with(FIELD_TILE_SPEC, key).into_ref())
    }

    #[test]
    fn subclass_construction_is_not_captured() {
        let controller = controller();
        let sub = FieldBag::new("com.android.systemui.qs.QuickQSPanel").into_ref();
        let mut param = MethodHookParam::new(sub, &[], None);
        controller.inner.on_panel_constructed(&mut param).unwrap();
        assert_eq!(controller.phase(), PanelPhase::Unattached);
        assert!(controller.panel().is_none());
    }

    #[test]
    fn panel_is_captured_once() {
        let controller = controller();
        let panel_type = controller.symbols().panel_type.clone();
        let first = FieldBag::new(&panel_type).into_ref();
        let second = FieldBag::new(&panel_type).into_ref();
        for obj in [&first, &second] {
            let mut param = MethodHookParam::new(obj.clone(), &[], None);
            controller.inner.on_panel_constructed(&mut param).unwrap();
        }
        assert_eq!(controller.phase(), PanelPhase::Attached);
        assert_eq!(controller.panel(), Some(first));
    }

    #[test]
    fn set_tiles_reconciles_and_syncs() {
        let controller = controller();
        let panel_type = controller.symbols().panel_type.clone();
        let host = FieldBag::new("QSTileHost").into_ref();
        let panel = FieldBag::new(&panel_type)
            .with(FIELD_TILE_HOST, host)
            .into_ref();
        let args = [HostValue::List(vec![tile("wifi"), tile("bt")])];
        let mut param = MethodHookParam::new(panel, &args, None);
        controller.inner.on_set_tiles(&mut param).unwrap();

        assert_eq!(controller.phase(), PanelPhase::Synced);
        assert_eq!(controller.registered_keys(), vec!["bt", "wifi"]);
        assert!(controller.distributor().is_some());
    }

    #[test]
    fn set_tiles_without_list_argument_fails() {
        let controller = controller();
        let panel_type = controller.symbols().panel_type.clone();
        let panel = FieldBag::new(&panel_type)
            .with(FIELD_TILE_HOST, FieldBag::new("QSTileHost").into_ref())
            .into_ref();
        let args = [HostValue::Int(3)];
        let mut param = MethodHookParam::new(panel, &args, None);
        let err = controller.inner.on_set_tiles(&mut param).unwrap_err();
        assert!(matches!(err, Error::Host(HostError::Argument { index: 0, .. })));
        assert!(controller.registered_keys().is_empty());
    }

    #[test]
    fn keyless_tiles_are_skipped() {
        let keyless = HostValue::Object(FieldBag::new("QSTile").into_ref());
        let items = keyed_tiles(&[tile("wifi"), HostValue::Null, keyless]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0, "wifi");
    }

    #[test]
    fn config_change_before_attach_is_stored() {
        let controller = controller();
        controller.on_config_changed(&ConfigDelta::columns(5));
        assert_eq!(controller.config().columns, 5);
    }

    fn synced_controller() -> (PanelController, HostRef) {
        let controller = controller();
        let panel_type = controller.symbols().panel_type.clone();
        let panel = FieldBag::new(&panel_type)
            .with(FIELD_TILE_HOST, FieldBag::new("QSTileHost").into_ref())
            .into_ref();
        let args = [HostValue::List(vec![tile("wifi")])];
        let mut param = MethodHookParam::new(panel.clone(), &args, None);
        controller.inner.on_set_tiles(&mut param).unwrap();
        (controller, panel)
    }

    fn handler_factory<F>(f: F) -> HandlerFactory
    where
        F: FnOnce(&HandlerContext<'_>) -> Result<Vec<Box<dyn PanelHandler>>, Error> + 'static,
    {
        Box::new(f)
    }

    struct Named(&'static str);

    impl PanelHandler for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    struct Seen(Cell<u32>);

    impl TileEventListener for Seen {
        fn on_tile_event(&self, _event: &TileEvent) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn handler_factory_runs_on_first_collection_only() {
        let controller = controller();
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        controller.set_handler_factory(handler_factory(move |ctx| {
            counter.set(counter.get() + 1);
            assert!(ctx.distributor.is_empty());
            Ok(vec![Box::new(Named("quick_pulldown")) as Box<dyn PanelHandler>])
        }));

        let panel_type = controller.symbols().panel_type.clone();
        let panel = FieldBag::new(&panel_type)
            .with(FIELD_TILE_HOST, FieldBag::new("QSTileHost").into_ref())
            .into_ref();
        for keys in [vec!["wifi"], vec!["wifi", "bt"], vec![]] {
            let args = [HostValue::List(keys.into_iter().map(tile).collect())];
            let mut param = MethodHookParam::new(panel.clone(), &args, None);
            controller.inner.on_set_tiles(&mut param).unwrap();
        }
        assert_eq!(runs.get(), 1);
        assert_eq!(controller.handler_names(), vec!["quick_pulldown"]);
    }

    #[test]
    fn panicking_handler_factory_does_not_block_reconcile() {
        let controller = controller();
        controller.set_handler_factory(handler_factory(|_| panic!("no pulldown")));
        let panel_type = controller.symbols().panel_type.clone();
        let panel = FieldBag::new(&panel_type)
            .with(FIELD_TILE_HOST, FieldBag::new("QSTileHost").into_ref())
            .into_ref();
        let args = [HostValue::List(vec![tile("wifi")])];
        let mut param = MethodHookParam::new(panel, &args, None);
        controller.inner.on_set_tiles(&mut param).unwrap();
        assert!(controller.handler_names().is_empty());
        assert_eq!(controller.registered_keys(), vec!["wifi"]);
    }

    #[test]
    fn unreadable_records_still_dispatch_config_event() {
        // The bare panel has no `mRecords` field.
        let (controller, _panel) = synced_controller();
        let seen = Rc::new(Seen(Cell::new(0)));
        controller
            .distributor()
            .unwrap()
            .subscribe("listener", seen.clone());

        controller.on_config_changed(&ConfigDelta::columns(4));
        assert_eq!(seen.0.get(), 1);
        assert_eq!(controller.config().columns, 4);
    }

    #[test]
    fn reentrant_state_access_is_an_error() {
        let controller = controller();
        let _guard = controller.inner.state.borrow_mut();
        let err = controller.inner.with_state("probe", |_| ()).unwrap_err();
        assert!(matches!(err, Error::Reentrant { operation: "probe" }));
    }
}
