#![forbid(unsafe_code)]

//! A scripted quick-settings host.
//!
//! [`FakeSystemUi`] declares the host types named by [`HostSymbols`], builds
//! the objects a panel controller touches, and exposes helpers that drive
//! the host the way the real UI would: constructing the panel, handing it a
//! tile collection, refreshing resources, changing tuner settings.
//!
//! Method bodies mirror the host's observable behavior closely enough for
//! the controller's hooks to matter:
//!
//! - `TileLayout.updateResources()` resets height, margins and columns to
//!   their resource defaults but leaves the cell width alone, so a broken
//!   baseline restore would compound.
//! - `QSPanel.updateResources()` calls through to the layout refresh.
//! - `QSPanel.setTiles(..)` rebuilds `mRecords` from the incoming tiles.
//! - `QSTileView.handleStateChanged(..)` shows the padlock badge.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tilehook_core::brightness::{
    DRAWABLE_ICON_BACKGROUND, FIELD_AUTOMATIC, FIELD_BRIGHTNESS_VIEW, FIELD_ICON, FIELD_TILE_HOST,
};
use tilehook_core::controller::{FIELD_RECORDS, FIELD_RECORD_TILE, FIELD_TILE_SPEC};
use tilehook_core::restrictions::FIELD_PADLOCK;
use tilehook_core::{HostError, HostRef, HostSymbols, HostValue, Intent, Visibility};

use crate::runtime::{FakeObject, HostRuntime};

pub const DEFAULT_CELL_WIDTH: i32 = 100;
pub const DEFAULT_CELL_HEIGHT: i32 = 120;
pub const DEFAULT_CELL_MARGIN: i32 = 12;
pub const DEFAULT_CELL_MARGIN_TOP: i32 = 20;
pub const DEFAULT_COLUMNS: i32 = 3;

/// Subclass of the panel type that the host also constructs.
pub const QUICK_PANEL_TYPE: &str = "com.android.systemui.qs.QuickQSPanel";

const TILE_TYPE: &str = "com.android.systemui.qs.QSTile";
const RECORD_TYPE: &str = "com.android.systemui.qs.QSPanel$TileRecord";
const VIEW_TYPE: &str = "android.view.View";
const IMAGE_VIEW_TYPE: &str = "android.widget.ImageView";
const RESOURCES_TYPE: &str = "android.content.res.Resources";

const DRAWABLE_AUTO_ON: &str = "ic_qs_brightness_auto_on";
const DRAWABLE_AUTO_OFF: &str = "ic_qs_brightness_auto_off";
pub const RES_AUTO_ON: i32 = 1;
pub const RES_AUTO_OFF: i32 = 2;
pub const RES_RIPPLE: i32 = 3;

/// Snapshot of the tile layout's geometry fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub cell_width: i32,
    pub cell_height: i32,
    pub cell_margin: i32,
    pub cell_margin_top: i32,
    pub columns: i32,
}

/// A fake quick-settings host process.
pub struct FakeSystemUi {
    runtime: Rc<HostRuntime>,
    symbols: HostSymbols,
    tile_host: Rc<FakeObject>,
    layout: Rc<FakeObject>,
    slider: Rc<FakeObject>,
    icon: Rc<FakeObject>,
    brightness: Rc<FakeObject>,
    panel: RefCell<Option<Rc<FakeObject>>>,
    tiles: RefCell<HashMap<String, Rc<FakeObject>>>,
    broadcasts: Rc<RefCell<Vec<String>>>,
    started: Rc<RefCell<Vec<String>>>,
}

impl FakeSystemUi {
    /// A host exposing every type in [`HostSymbols::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::without(&[])
    }

    /// A host where the listed types were never loaded. Hooks targeting them
    /// fail to attach.
    #[must_use]
    pub fn without(missing: &[&str]) -> Self {
        let symbols = HostSymbols::default();
        let runtime = HostRuntime::new();
        declare_types(&runtime, &symbols, missing);

        let broadcasts = Rc::new(RefCell::new(Vec::new()));
        let started = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&started);
        let tile_host = runtime
            .object(&symbols.tile_host_type)
            .method("startActivityDismissingKeyguard", move |_, args| {
                let action = args
                    .first()
                    .and_then(HostValue::as_intent)
                    .map(|intent| intent.action.clone())
                    .unwrap_or_default();
                log.borrow_mut().push(action);
                Ok(HostValue::Null)
            })
            .build();

        let layout = runtime
            .object(&symbols.tile_layout_type)
            .field("mCellWidth", DEFAULT_CELL_WIDTH)
            .field("mCellHeight", DEFAULT_CELL_HEIGHT)
            .field("mCellMargin", DEFAULT_CELL_MARGIN)
            .field("mCellMarginTop", DEFAULT_CELL_MARGIN_TOP)
            .field("mColumns", DEFAULT_COLUMNS)
            .method("updateResources", |this, _| {
                this.set_int_field("mCellHeight", DEFAULT_CELL_HEIGHT)?;
                this.set_int_field("mCellMargin", DEFAULT_CELL_MARGIN)?;
                this.set_int_field("mCellMarginTop", DEFAULT_CELL_MARGIN_TOP)?;
                this.set_int_field("mColumns", DEFAULT_COLUMNS)?;
                Ok(HostValue::Bool(false))
            })
            .build();

        let slider = runtime
            .object(VIEW_TYPE)
            .field("visibility", Visibility::Visible.to_host())
            .build();

        let package = symbols.host_package.clone();
        let resources = runtime
            .object(RESOURCES_TYPE)
            .method("getIdentifier", move |_, args| {
                let name = args.first().and_then(HostValue::as_str);
                let kind = args.get(1).and_then(HostValue::as_str);
                let pkg = args.get(2).and_then(HostValue::as_str);
                if kind != Some("drawable") || pkg != Some(package.as_str()) {
                    return Ok(HostValue::Int(0));
                }
                let id = match name {
                    Some(DRAWABLE_AUTO_ON) => RES_AUTO_ON,
                    Some(DRAWABLE_AUTO_OFF) => RES_AUTO_OFF,
                    Some(DRAWABLE_ICON_BACKGROUND) => RES_RIPPLE,
                    _ => 0,
                };
                Ok(HostValue::Int(id))
            })
            .build();

        let log = Rc::clone(&broadcasts);
        let icon = runtime
            .object(IMAGE_VIEW_TYPE)
            .field("visibility", Visibility::Visible.to_host())
            .field("onClick", HostValue::Null)
            .field("onLongClick", HostValue::Null)
            .field("imageResource", 0)
            .field("backgroundResource", 0)
            .field("resources", resources.handle())
            .method("hasOnClickListeners", |this, _| {
                Ok(HostValue::Bool(!this.field("onClick")?.is_null()))
            })
            .method("setOnClickListener", |this, args| {
                this.set_field("onClick", args.first().cloned().unwrap_or_default())?;
                Ok(HostValue::Null)
            })
            .method("setOnLongClickListener", |this, args| {
                this.set_field("onLongClick", args.first().cloned().unwrap_or_default())?;
                Ok(HostValue::Null)
            })
            .method("getResources", |this, _| this.field("resources"))
            .method("setBackgroundResource", |this, args| {
                this.set_field("backgroundResource", args.first().cloned().unwrap_or_default())?;
                Ok(HostValue::Null)
            })
            .method("setImageResource", |this, args| {
                this.set_field("imageResource", args.first().cloned().unwrap_or_default())?;
                Ok(HostValue::Null)
            })
            .method("sendBroadcast", move |_, args| {
                let action = args
                    .first()
                    .and_then(HostValue::as_intent)
                    .map(|intent| intent.action.clone())
                    .unwrap_or_default();
                log.borrow_mut().push(action);
                Ok(HostValue::Null)
            })
            .build();

        let brightness = runtime
            .object(&symbols.brightness_controller_type)
            .field(FIELD_ICON, icon.handle())
            .field(FIELD_AUTOMATIC, false)
            .method("updateIcon", |this, args| {
                let automatic = args.first().and_then(HostValue::as_bool).unwrap_or(false);
                this.set_field(FIELD_AUTOMATIC, automatic)?;
                Ok(HostValue::Null)
            })
            .build();

        Self {
            runtime,
            symbols,
            tile_host,
            layout,
            slider,
            icon,
            brightness,
            panel: RefCell::new(None),
            tiles: RefCell::new(HashMap::new()),
            broadcasts,
            started,
        }
    }

    /// The interception capability to install hooks through.
    #[must_use]
    pub fn runtime(&self) -> &Rc<HostRuntime> {
        &self.runtime
    }

    #[must_use]
    pub fn symbols(&self) -> &HostSymbols {
        &self.symbols
    }

    /// A tile key inside the extension namespace.
    #[must_use]
    pub fn extension_key(&self, name: &str) -> String {
        format!("{}.{}", self.symbols.tile_namespace, name)
    }

    /// Construct the panel, running constructor hooks.
    pub fn construct_panel(&self) -> HostRef {
        let panel = self.build_panel(&self.symbols.panel_type.clone(), true);
        let handle = panel.handle();
        *self.panel.borrow_mut() = Some(panel);
        handle
    }

    /// Build the panel without constructor hooks, as if the hooks were
    /// installed after the host already created it.
    pub fn preexisting_panel(&self) -> HostRef {
        let panel = self.build_panel(&self.symbols.panel_type.clone(), false);
        let handle = panel.handle();
        *self.panel.borrow_mut() = Some(panel);
        handle
    }

    /// Construct a panel subclass instance. It is not tracked as the host's
    /// main panel.
    pub fn construct_subclass_panel(&self) -> Rc<FakeObject> {
        self.build_panel(QUICK_PANEL_TYPE, true)
    }

    fn build_panel(&self, type_name: &str, construct: bool) -> Rc<FakeObject> {
        let runtime = Rc::downgrade(&self.runtime);
        let layout = self.layout.handle();
        let slider = self.slider.handle();
        let tuning_key = self.symbols.tuning_brightness_key.clone();

        let builder = self
            .runtime
            .object(type_name)
            .field(FIELD_TILE_HOST, self.tile_host.handle())
            .field(FIELD_BRIGHTNESS_VIEW, slider.clone())
            .field(FIELD_RECORDS, HostValue::List(Vec::new()))
            .method("setTiles", move |this, args| {
                let Some(runtime) = runtime.upgrade() else {
                    return Ok(HostValue::Null);
                };
                let tiles = args.first().and_then(HostValue::as_list).ok_or_else(|| {
                    HostError::Argument {
                        method: "setTiles".into(),
                        index: 0,
                        expected: "list",
                    }
                })?;
                let records = tiles
                    .iter()
                    .filter(|tile| tile.as_object().is_some())
                    .map(|tile| {
                        let record = runtime
                            .object(RECORD_TYPE)
                            .field(FIELD_RECORD_TILE, tile.clone())
                            .build();
                        HostValue::Object(record.handle())
                    })
                    .collect();
                this.set_field(FIELD_RECORDS, HostValue::List(records))?;
                Ok(HostValue::Null)
            })
            .method("updateResources", move |_, _| {
                layout.call("updateResources", &[])?;
                Ok(HostValue::Null)
            })
            .method("onTuningChanged", move |_, args| {
                if args.first().and_then(HostValue::as_str) != Some(tuning_key.as_str()) {
                    return Ok(HostValue::Null);
                }
                let shown = args.get(1).and_then(HostValue::as_str) != Some("0");
                slider.call(
                    "setVisibility",
                    &[HostValue::Int(Visibility::shown_if(shown).to_host())],
                )?;
                Ok(HostValue::Null)
            });
        if construct {
            builder.construct()
        } else {
            builder.build()
        }
    }

    /// The tracked main panel.
    ///
    /// # Panics
    ///
    /// If no panel was constructed yet.
    #[must_use]
    pub fn panel(&self) -> Rc<FakeObject> {
        let panel = self.panel.borrow();
        Rc::clone(panel.as_ref().expect("panel constructed"))
    }

    /// The tile object for `key`, created on first use and reused after.
    pub fn tile(&self, key: &str) -> HostRef {
        let mut tiles = self.tiles.borrow_mut();
        let tile = tiles.entry(key.to_string()).or_insert_with(|| {
            self.runtime
                .object(TILE_TYPE)
                .field(FIELD_TILE_SPEC, key)
                .build()
        });
        tile.handle()
    }

    /// Forget every cached tile object so the next [`Self::set_tiles`] hands
    /// over fresh instances.
    pub fn recreate_tiles(&self) {
        self.tiles.borrow_mut().clear();
    }

    /// Hand the panel a tile collection with the given keys.
    pub fn set_tiles(&self, keys: &[&str]) -> Result<HostValue, HostError> {
        let tiles: Vec<HostValue> = keys
            .iter()
            .map(|key| HostValue::Object(self.tile(key)))
            .collect();
        self.panel()
            .handle()
            .call("setTiles", &[HostValue::List(tiles)])
    }

    /// Hand an arbitrary panel instance a tile collection.
    pub fn set_tiles_on(&self, panel: &HostRef, keys: &[&str]) -> Result<HostValue, HostError> {
        let tiles: Vec<HostValue> = keys
            .iter()
            .map(|key| HostValue::Object(self.tile(key)))
            .collect();
        panel.call("setTiles", &[HostValue::List(tiles)])
    }

    /// The host refreshing the panel's resources.
    pub fn refresh(&self) -> Result<HostValue, HostError> {
        self.panel().handle().call("updateResources", &[])
    }

    /// The host refreshing only the tile layout. Returns whether the layout
    /// reported a change.
    pub fn refresh_layout(&self) -> Result<bool, HostError> {
        self.layout.handle().call_bool("updateResources", &[])
    }

    /// A tuner setting changed.
    pub fn tune(&self, key: &str, value: &str) -> Result<HostValue, HostError> {
        self.panel()
            .handle()
            .call("onTuningChanged", &[key.into(), value.into()])
    }

    /// The brightness controller updating its icon.
    pub fn update_brightness_icon(&self, automatic: bool) -> Result<HostValue, HostError> {
        self.brightness
            .handle()
            .call("updateIcon", &[HostValue::Bool(automatic)])
    }

    #[must_use]
    pub fn geometry(&self) -> Geometry {
        Geometry {
            cell_width: self.layout.int("mCellWidth"),
            cell_height: self.layout.int("mCellHeight"),
            cell_margin: self.layout.int("mCellMargin"),
            cell_margin_top: self.layout.int("mCellMarginTop"),
            columns: self.layout.int("mColumns"),
        }
    }

    #[must_use]
    pub fn layout(&self) -> &Rc<FakeObject> {
        &self.layout
    }

    #[must_use]
    pub fn slider_visibility(&self) -> Option<Visibility> {
        Visibility::from_host(self.slider.int("visibility"))
    }

    #[must_use]
    pub fn icon(&self) -> &Rc<FakeObject> {
        &self.icon
    }

    #[must_use]
    pub fn icon_visibility(&self) -> Option<Visibility> {
        Visibility::from_host(self.icon.int("visibility"))
    }

    /// Resource id last set on the icon; `0` when none.
    #[must_use]
    pub fn icon_resource(&self) -> i32 {
        self.icon.int("imageResource")
    }

    /// Background resource id set on the icon; `0` when none.
    #[must_use]
    pub fn icon_background(&self) -> i32 {
        self.icon.int("backgroundResource")
    }

    /// Fire the icon's click handler. `None` when no handler is installed.
    pub fn click_icon(&self) -> Option<bool> {
        self.fire_icon("onClick")
    }

    /// Fire the icon's long-press handler. `None` when no handler is
    /// installed.
    pub fn long_click_icon(&self) -> Option<bool> {
        self.fire_icon("onLongClick")
    }

    fn fire_icon(&self, field: &str) -> Option<bool> {
        match self.icon.get(field) {
            HostValue::Callback(callback) => Some(callback.on_event(&self.icon.handle())),
            _ => None,
        }
    }

    #[must_use]
    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.borrow().clone()
    }

    /// Activity actions the tile host actually started.
    #[must_use]
    pub fn started_activities(&self) -> Vec<String> {
        self.started.borrow().clone()
    }

    /// The tile host being asked to start an activity for `action`.
    pub fn start_activity(&self, action: &str) -> Result<HostValue, HostError> {
        self.tile_host.handle().call(
            "startActivityDismissingKeyguard",
            &[HostValue::Intent(Intent::new(action))],
        )
    }

    #[must_use]
    pub fn tile_host(&self) -> &Rc<FakeObject> {
        &self.tile_host
    }

    /// A tile view with a visible padlock badge. Returns the view and the
    /// badge.
    pub fn tile_view(&self) -> (Rc<FakeObject>, Rc<FakeObject>) {
        let padlock = self
            .runtime
            .object(IMAGE_VIEW_TYPE)
            .field("visibility", Visibility::Gone.to_host())
            .build();
        let view = self
            .runtime
            .object(&self.symbols.tile_view_type)
            .field(FIELD_PADLOCK, padlock.handle())
            .method("handleStateChanged", |this, _| {
                if let Some(padlock) = this.object_field(FIELD_PADLOCK)? {
                    padlock.call(
                        "setVisibility",
                        &[HostValue::Int(Visibility::Visible.to_host())],
                    )?;
                }
                Ok(HostValue::Null)
            })
            .build();
        (view, padlock)
    }

    /// The host delivering a state change to `view`.
    pub fn handle_state_changed(&self, view: &FakeObject) -> Result<HostValue, HostError> {
        let state = self.runtime.object(&self.symbols.tile_state_type).build();
        view.handle()
            .call("handleStateChanged", &[HostValue::Object(state.handle())])
    }
}

impl Default for FakeSystemUi {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FakeSystemUi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeSystemUi")
            .field("runtime", &self.runtime)
            .field("geometry", &self.geometry())
            .field("panel", &self.panel.borrow().is_some())
            .finish()
    }
}

fn declare_types(runtime: &HostRuntime, symbols: &HostSymbols, missing: &[&str]) {
    let present = |type_name: &str| !missing.contains(&type_name);

    if present(&symbols.panel_type) {
        let panel = symbols.panel_type.as_str();
        runtime.declare_type(panel, None);
        runtime.declare_method(panel, "setTiles", &["java.util.Collection"]);
        runtime.declare_method(panel, "updateResources", &[]);
        runtime.declare_method(
            panel,
            "onTuningChanged",
            &["java.lang.String", "java.lang.String"],
        );
        runtime.declare_type(QUICK_PANEL_TYPE, Some(panel));
    }
    if present(&symbols.tile_layout_type) {
        runtime.declare_type(&symbols.tile_layout_type, None);
        runtime.declare_method(&symbols.tile_layout_type, "updateResources", &[]);
    }
    if present(&symbols.brightness_controller_type) {
        runtime.declare_type(&symbols.brightness_controller_type, None);
        runtime.declare_method(&symbols.brightness_controller_type, "updateIcon", &["boolean"]);
    }
    if present(&symbols.tile_state_type) {
        runtime.declare_type(&symbols.tile_state_type, None);
    }
    if present(&symbols.tile_view_type) {
        runtime.declare_type(&symbols.tile_view_type, None);
        runtime.declare_method(
            &symbols.tile_view_type,
            "handleStateChanged",
            &[symbols.tile_state_type.as_str()],
        );
    }
    if present(&symbols.tile_host_type) {
        runtime.declare_type(&symbols.tile_host_type, None);
        runtime.declare_method(
            &symbols.tile_host_type,
            "startActivityDismissingKeyguard",
            &["android.content.Intent"],
        );
    }
}
