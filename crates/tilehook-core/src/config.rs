#![forbid(unsafe_code)]

//! Panel configuration, preference snapshots, and the host symbol table.
//!
//! # Layers
//!
//! - [`PreferenceSnapshot`]: the raw key/value view of persisted
//!   preferences, reloaded from a [`PreferenceSource`]. Wrapper factories
//!   receive it so individual tiles can read their own keys.
//! - [`PanelConfig`]: the four scalar settings the panel itself acts on.
//!   Seeded from a snapshot at startup, then mutated only by
//!   [`ConfigDelta`] events.
//! - [`HostSymbols`]: every host type, method, field and action name the
//!   core touches. Defaults match the stock host; overriding an entry is how
//!   a renamed host symbol is accommodated.
//!
//! ```toml
//! qs_tiles_per_row = "4"
//! qs_scale_correction = 10
//! qs_hide_brightness = false
//! qs_brightness_icon = true
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Preference key: tiles per row (`0` = host default).
pub const KEY_COLUMNS: &str = "qs_tiles_per_row";
/// Preference key: scale correction in percent.
pub const KEY_SCALE_CORRECTION: &str = "qs_scale_correction";
/// Preference key: hide the brightness slider.
pub const KEY_HIDE_BRIGHTNESS: &str = "qs_hide_brightness";
/// Preference key: show the auto-brightness icon.
pub const KEY_BRIGHTNESS_ICON: &str = "qs_brightness_icon";

/// Column counts with a dedicated scale factor. Anything else scales like `0`.
pub const RECOGNIZED_COLUMNS: [i32; 5] = [0, 3, 4, 5, 6];

// ---------------------------------------------------------------------------
// Preference snapshot
// ---------------------------------------------------------------------------

/// One persisted preference value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

/// Immutable view of the preference store at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreferenceSnapshot {
    values: BTreeMap<String, PrefValue>,
}

impl PreferenceSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: PrefValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PrefValue) {
        self.values.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PrefValue> {
        self.values.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(PrefValue::Bool(b)) => Ok(*b),
            Some(other) => Err(invalid(key, other)),
        }
    }

    /// Integer preference. Numeric strings are accepted since list
    /// preferences persist their selection as text.
    pub fn int_or(&self, key: &str, default: i32) -> Result<i32, ConfigError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(PrefValue::Int(v)) => i32::try_from(*v).map_err(|_| invalid(key, &PrefValue::Int(*v))),
            Some(PrefValue::Str(s)) => s
                .trim()
                .parse::<i32>()
                .map_err(|_| invalid(key, &PrefValue::Str(s.clone()))),
            Some(other) => Err(invalid(key, other)),
        }
    }

    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(PrefValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }
}

fn invalid(key: &str, value: &PrefValue) -> ConfigError {
    let value = match value {
        PrefValue::Bool(b) => b.to_string(),
        PrefValue::Int(v) => v.to_string(),
        PrefValue::Str(s) => s.clone(),
    };
    ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    }
}

/// Where preference snapshots come from.
pub trait PreferenceSource {
    /// Re-read the backing store and return a fresh snapshot.
    fn reload(&mut self) -> Result<PreferenceSnapshot, ConfigError>;
}

/// In-memory preferences.
#[derive(Debug, Clone, Default)]
pub struct StaticPreferences {
    snapshot: PreferenceSnapshot,
}

impl StaticPreferences {
    #[must_use]
    pub fn new(snapshot: PreferenceSnapshot) -> Self {
        Self { snapshot }
    }

    /// Replace the stored snapshot; the next `reload` returns it.
    pub fn replace(&mut self, snapshot: PreferenceSnapshot) {
        self.snapshot = snapshot;
    }
}

impl PreferenceSource for StaticPreferences {
    fn reload(&mut self) -> Result<PreferenceSnapshot, ConfigError> {
        Ok(self.snapshot.clone())
    }
}

/// Preferences persisted as a flat TOML table.
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceSource for FilePreferences {
    fn reload(&mut self) -> Result<PreferenceSnapshot, ConfigError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        PreferenceSnapshot::from_toml_str(&content)
    }
}

// ---------------------------------------------------------------------------
// Panel configuration
// ---------------------------------------------------------------------------

/// Scalar settings the panel acts on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Tiles per row; `0` leaves the host's own choice in place.
    pub columns: i32,
    pub scale_correction_percent: i32,
    pub hide_brightness_slider: bool,
    pub brightness_icon_enabled: bool,
}

impl PanelConfig {
    pub fn from_snapshot(snapshot: &PreferenceSnapshot) -> Result<Self, ConfigError> {
        Ok(Self {
            columns: snapshot.int_or(KEY_COLUMNS, 0)?,
            scale_correction_percent: snapshot.int_or(KEY_SCALE_CORRECTION, 0)?,
            hide_brightness_slider: snapshot.bool_or(KEY_HIDE_BRIGHTNESS, false)?,
            brightness_icon_enabled: snapshot.bool_or(KEY_BRIGHTNESS_ICON, false)?,
        })
    }

    #[must_use]
    pub fn has_recognized_columns(&self) -> bool {
        RECOGNIZED_COLUMNS.contains(&self.columns)
    }

    /// Apply the present fields of `delta` and report which groups it
    /// touched. A present key counts even when it repeats the stored value,
    /// so a re-sent event still reapplies the host overrides.
    pub fn apply(&mut self, delta: &ConfigDelta) -> ConfigChange {
        let mut change = ConfigChange::default();
        if let Some(columns) = delta.columns {
            change.geometry = true;
            self.columns = columns;
        }
        if let Some(correction) = delta.scale_correction_percent {
            change.geometry = true;
            self.scale_correction_percent = correction;
        }
        if let Some(hide) = delta.hide_brightness_slider {
            change.slider = true;
            self.hide_brightness_slider = hide;
        }
        if let Some(icon) = delta.brightness_icon_enabled {
            change.icon = true;
            self.brightness_icon_enabled = icon;
        }
        change
    }
}

/// A configuration-change event: only present keys represent a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_correction_percent: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_brightness_slider: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_icon_enabled: Option<bool>,
}

impl ConfigDelta {
    #[must_use]
    pub fn columns(columns: i32) -> Self {
        Self {
            columns: Some(columns),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn scale_correction(percent: i32) -> Self {
        Self {
            scale_correction_percent: Some(percent),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn hide_brightness(hide: bool) -> Self {
        Self {
            hide_brightness_slider: Some(hide),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn brightness_icon(enabled: bool) -> Self {
        Self {
            brightness_icon_enabled: Some(enabled),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Which groups of settings a delta carried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChange {
    /// Columns or scale correction.
    pub geometry: bool,
    pub slider: bool,
    pub icon: bool,
}

impl ConfigChange {
    #[must_use]
    pub fn any(&self) -> bool {
        self.geometry || self.slider || self.icon
    }
}

// ---------------------------------------------------------------------------
// Host symbols
// ---------------------------------------------------------------------------

/// Names of host types, members and actions the core relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSymbols {
    pub panel_type: String,
    pub tile_layout_type: String,
    pub brightness_controller_type: String,
    pub tile_view_type: String,
    pub tile_state_type: String,
    pub tile_host_type: String,

    /// Substring marking a tile key as belonging to this system.
    pub tile_namespace: String,
    /// Package whose drawables the brightness icon resolves against.
    pub host_package: String,
    pub tuning_brightness_key: String,

    pub action_toggle_auto_brightness: String,
    pub action_display_settings: String,
    pub action_admin_support_details: String,
}

impl Default for HostSymbols {
    fn default() -> Self {
        Self {
            panel_type: "com.android.systemui.qs.QSPanel".into(),
            tile_layout_type: "com.android.systemui.qs.TileLayout".into(),
            brightness_controller_type: "com.android.systemui.settings.BrightnessController"
                .into(),
            tile_view_type: "com.android.systemui.qs.QSTileView".into(),
            tile_state_type: "com.android.systemui.qs.QSTile$State".into(),
            tile_host_type: "com.android.systemui.statusbar.phone.QSTileHost".into(),
            tile_namespace: "com.ceco.nougat.gravitybox".into(),
            host_package: "com.android.systemui".into(),
            tuning_brightness_key: "qs_show_brightness".into(),
            action_toggle_auto_brightness: "gravitybox.intent.action.TOGGLE_AUTO_BRIGHTNESS"
                .into(),
            action_display_settings: "android.settings.DISPLAY_SETTINGS".into(),
            action_admin_support_details: "android.settings.SHOW_ADMIN_SUPPORT_DETAILS".into(),
        }
    }
}

impl HostSymbols {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}
