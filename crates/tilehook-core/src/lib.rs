// Forbid unsafe in production; deny in tests.
#![cfg_attr(not(test), forbid(unsafe_code))]
#![cfg_attr(test, deny(unsafe_code))]

//! Tile panel interception core.
//!
//! # Role
//! `tilehook-core` attaches to a host process's live tile panel through an
//! externally supplied interception capability and keeps a locally owned
//! wrapper per tile the host displays. It also overrides the host's tile grid
//! geometry (columns per row, scale) and manages the brightness slider and
//! icon affordances.
//!
//! # Primary responsibilities
//! - **ExtensionRegistry**: create/rebind/destroy reconciliation of tile
//!   wrappers against the host's tile collection.
//! - **LayoutAdjuster**: idempotent grid geometry override.
//! - **PanelController**: hook wiring, panel lifecycle, configuration events.
//!
//! # How it fits together
//! The host drives everything. Configuration events mutate [`PanelConfig`]
//! and trigger a host resource refresh; the refresh is intercepted and the
//! geometry recomputed. Tile collection changes are intercepted and
//! reconciled before the host proceeds.
//!
//! All entry points run synchronously on the host's UI thread.

pub mod brightness;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod host;
pub mod intercept;
pub mod layout;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod registry;
pub mod restrictions;
pub mod scaling;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{
    ConfigChange, ConfigDelta, FilePreferences, HostSymbols, PanelConfig, PrefValue,
    PreferenceSnapshot, PreferenceSource, StaticPreferences,
};
pub use controller::{HandlerContext, HandlerFactory, PanelController, PanelHandler, PanelPhase};
pub use error::{AttachError, ConfigError, Error, HostError, Result, WrapperError};
pub use events::{TileEvent, TileEventDistributor, TileEventListener};
pub use host::{HostObject, HostRef, HostValue, Intent, ViewCallback, Visibility};
pub use intercept::{HookFn, HookSite, InstallReport, Interceptor, MethodHook, MethodHookParam};
pub use layout::{GeometryFields, LayoutAdjuster, LayoutOutcome};
pub use registry::{
    ExtensionRegistry, ReconcileReport, TileNamespace, TileWrapper, WrapperContext,
    WrapperFactory, WrapperKind,
};
