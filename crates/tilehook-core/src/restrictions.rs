#![forbid(unsafe_code)]

//! Hooks that strip device-admin restriction UI from tiles.
//!
//! - Tile views hide their padlock badge after every state change.
//! - Attempts by the tile host to open the admin support details screen are
//!   swallowed: the call returns null and the activity is never started.
//!
//! Both are optional. Hosts without the relevant symbols simply don't get
//! them.

use crate::config::HostSymbols;
use crate::error::Error;
use crate::host::{HostValue, Visibility, set_view_visibility};
use crate::intercept::{HookSite, MethodHook, MethodHookParam};

/// Tile view field holding the padlock badge.
pub const FIELD_PADLOCK: &str = "mPadLock";

pub fn padlock_site(symbols: &HostSymbols) -> HookSite {
    HookSite::method(
        &symbols.tile_view_type,
        "handleStateChanged",
        [symbols.tile_state_type.as_str()],
    )
}

pub fn admin_dialog_site(symbols: &HostSymbols) -> HookSite {
    HookSite::method(
        &symbols.tile_host_type,
        "startActivityDismissingKeyguard",
        ["android.content.Intent"],
    )
}

/// After a tile view handles a state change, hide its padlock.
pub fn hide_padlock(param: &mut MethodHookParam<'_>) -> Result<(), Error> {
    if let Some(padlock) = param.this().object_field(FIELD_PADLOCK)? {
        set_view_visibility(&padlock, Visibility::Gone)?;
    }
    Ok(())
}

/// Skip the call when it would open the admin support details screen.
pub fn suppress_admin_dialog(param: &mut MethodHookParam<'_>, admin_action: &str) -> Result<(), Error> {
    let is_admin = param
        .arg(0)
        .and_then(HostValue::as_intent)
        .is_some_and(|intent| intent.action == admin_action);
    if is_admin {
        tracing::debug!(target: "tilehook.restrictions", "admin support dialog suppressed");
        param.set_result(HostValue::Null);
    }
    Ok(())
}

pub fn padlock_hook() -> MethodHook {
    MethodHook::after("hide_padlock", hide_padlock)
}

pub fn admin_dialog_hook(symbols: &HostSymbols) -> MethodHook {
    let action = symbols.action_admin_support_details.clone();
    MethodHook::before("suppress_admin_dialog", move |param| {
        suppress_admin_dialog(param, &action)
    })
}
