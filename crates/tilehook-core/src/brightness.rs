#![forbid(unsafe_code)]

//! Brightness slider visibility and the auto-brightness icon affordance.
//!
//! The slider is hidden or shown after every host resource refresh. The
//! icon gets two handlers: a click broadcasts the toggle-auto-brightness
//! action, a long press opens display settings through the tile host,
//! dismissing the lock screen. Both handlers swallow and log failures; the
//! long press reports "not handled" when it could not start the activity.

use std::cell::OnceCell;
use std::rc::Rc;

use crate::config::HostSymbols;
use crate::error::HostError;
use crate::host::{
    HostRef, HostValue, Intent, ViewCallback, Visibility, set_view_visibility, view_visibility,
};

/// Panel field holding the brightness slider view.
pub const FIELD_BRIGHTNESS_VIEW: &str = "mBrightnessView";
/// Panel field holding the tile host.
pub const FIELD_TILE_HOST: &str = "mHost";
/// Brightness controller field holding the icon view.
pub const FIELD_ICON: &str = "mIcon";
/// Brightness controller flag for automatic mode.
pub const FIELD_AUTOMATIC: &str = "mAutomatic";
/// Touch feedback drawable set behind the icon with its handlers.
pub const DRAWABLE_ICON_BACKGROUND: &str = "ripple";

/// The host panel handle: set once when the panel is constructed, never
/// cleared. Reads before capture see `None`.
pub type PanelHandle = Rc<OnceCell<HostRef>>;

/// Lazily resolved brightness slider view.
#[derive(Debug, Default)]
pub struct BrightnessSlider {
    view: Option<HostRef>,
}

impl BrightnessSlider {
    /// Resolve (and cache) the slider view from `panel`.
    pub fn resolve(&mut self, panel: &HostRef) -> Result<Option<HostRef>, HostError> {
        if self.view.is_none() {
            self.view = panel.object_field(FIELD_BRIGHTNESS_VIEW)?;
        }
        Ok(self.view.clone())
    }
}

/// Show or hide `slider`, invalidating `panel` only when the visibility
/// actually changes. Returns whether anything was toggled.
pub fn apply_slider_visibility(
    panel: &HostRef,
    slider: Option<&HostRef>,
    hide: bool,
) -> Result<bool, HostError> {
    let Some(slider) = slider else {
        return Ok(false);
    };
    let desired = Visibility::shown_if(!hide);
    if view_visibility(slider)? == desired {
        return Ok(false);
    }
    set_view_visibility(slider, desired)?;
    panel.call("postInvalidate", &[])?;
    tracing::debug!(target: "tilehook.brightness", hide, "slider visibility toggled");
    Ok(true)
}

/// Click handler: broadcast the toggle-auto-brightness action.
#[derive(Debug, Clone)]
pub struct ToggleAutoBrightness {
    action: String,
}

impl ToggleAutoBrightness {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }
}

impl ViewCallback for ToggleAutoBrightness {
    fn on_event(&self, view: &HostRef) -> bool {
        let intent = HostValue::Intent(Intent::new(self.action.clone()));
        match view.call("sendBroadcast", &[intent]) {
            Ok(_) => true,
            Err(err) => {
                tracing::error!(
                    target: "tilehook.brightness",
                    operation = "click",
                    error = %err,
                    "auto-brightness toggle broadcast failed"
                );
                false
            }
        }
    }
}

/// Long-press handler: open display settings through the tile host.
#[derive(Debug, Clone)]
pub struct OpenDisplaySettings {
    panel: PanelHandle,
    action: String,
}

impl OpenDisplaySettings {
    pub fn new(panel: PanelHandle, action: impl Into<String>) -> Self {
        Self {
            panel,
            action: action.into(),
        }
    }

    fn start(&self) -> Result<(), HostError> {
        let Some(panel) = self.panel.get() else {
            return Err(HostError::Invocation {
                type_name: "panel".into(),
                method: "startActivityDismissingKeyguard".into(),
                message: "panel not attached yet".into(),
            });
        };
        let host = panel
            .object_field(FIELD_TILE_HOST)?
            .ok_or_else(|| HostError::Invocation {
                type_name: panel.type_name().to_string(),
                method: "startActivityDismissingKeyguard".into(),
                message: "tile host is null".into(),
            })?;
        host.call(
            "startActivityDismissingKeyguard",
            &[HostValue::Intent(Intent::new(self.action.clone()))],
        )?;
        Ok(())
    }
}

impl ViewCallback for OpenDisplaySettings {
    fn on_event(&self, _view: &HostRef) -> bool {
        match self.start() {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    target: "tilehook.brightness",
                    operation = "long_click",
                    error = %err,
                    "could not open display settings"
                );
                false
            }
        }
    }
}

/// Decorate the brightness controller's icon after the host updated it.
///
/// Installs the click/long-press handlers and the touch feedback background
/// once, picks the auto on/off drawable when the host can resolve it, and
/// applies icon visibility.
pub fn update_icon(
    controller: &HostRef,
    icon_enabled: bool,
    symbols: &HostSymbols,
    panel: &PanelHandle,
) -> Result<(), HostError> {
    let Some(icon) = controller.object_field(FIELD_ICON)? else {
        return Ok(());
    };

    let resources = icon.call_object("getResources", &[])?;
    let drawable_id = |name: &str| {
        resources.call_int(
            "getIdentifier",
            &[
                name.into(),
                "drawable".into(),
                symbols.host_package.as_str().into(),
            ],
        )
    };

    if !icon.call_bool("hasOnClickListeners", &[])? {
        let click: Rc<dyn ViewCallback> =
            Rc::new(ToggleAutoBrightness::new(&symbols.action_toggle_auto_brightness));
        let long_click: Rc<dyn ViewCallback> = Rc::new(OpenDisplaySettings::new(
            Rc::clone(panel),
            &symbols.action_display_settings,
        ));
        icon.call("setOnClickListener", &[HostValue::Callback(click)])?;
        icon.call("setOnLongClickListener", &[HostValue::Callback(long_click)])?;
        let background = drawable_id(DRAWABLE_ICON_BACKGROUND)?;
        if background != 0 {
            icon.call("setBackgroundResource", &[HostValue::Int(background)])?;
        }
        tracing::debug!(target: "tilehook.brightness", background, "icon handlers installed");
    }

    let automatic = controller.bool_field(FIELD_AUTOMATIC)?;
    let res_id = drawable_id(if automatic {
        "ic_qs_brightness_auto_on"
    } else {
        "ic_qs_brightness_auto_off"
    })?;
    if res_id != 0 {
        icon.call("setImageResource", &[HostValue::Int(res_id)])?;
    }

    set_view_visibility(&icon, Visibility::shown_if(icon_enabled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FieldBag;

    fn view(visibility: Visibility) -> HostRef {
        FieldBag::new("View")
            .with("visibility", visibility.to_host())
            .into_ref()
    }

    #[test]
    fn slider_toggles_only_on_difference() {
        let panel_bag = FieldBag::new("QSPanel");
        let calls = panel_bag.calls();
        let panel = panel_bag.into_ref();
        let slider = view(Visibility::Visible);

        assert!(!apply_slider_visibility(&panel, Some(&slider), false).unwrap());
        assert!(calls.borrow().is_empty());

        assert!(apply_slider_visibility(&panel, Some(&slider), true).unwrap());
        assert_eq!(view_visibility(&slider).unwrap(), Visibility::Gone);
        assert_eq!(*calls.borrow(), vec!["postInvalidate".to_string()]);

        assert!(!apply_slider_visibility(&panel, Some(&slider), true).unwrap());
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn missing_slider_is_not_an_error() {
        let panel = FieldBag::new("QSPanel").into_ref();
        assert!(!apply_slider_visibility(&panel, None, true).unwrap());
    }

    #[test]
    fn slider_is_cached_after_first_resolve() {
        let slider = view(Visibility::Visible);
        let panel = FieldBag::new("QSPanel")
            .with(FIELD_BRIGHTNESS_VIEW, slider.clone())
            .into_ref();
        let mut resolved = BrightnessSlider::default();
        assert_eq!(resolved.resolve(&panel).unwrap(), Some(slider.clone()));
        panel.set_field(FIELD_BRIGHTNESS_VIEW, HostValue::Null).unwrap();
        assert_eq!(resolved.resolve(&panel).unwrap(), Some(slider));
    }

    #[test]
    fn long_press_before_attach_is_not_handled() {
        let handler = OpenDisplaySettings::new(PanelHandle::default(), "display");
        let icon = view(Visibility::Visible);
        assert!(!handler.on_event(&icon));
    }

    #[test]
    fn click_broadcast_failure_is_swallowed() {
        let handler = ToggleAutoBrightness::new("toggle");
        let icon = FieldBag::new("ImageView")
            .failing("sendBroadcast")
            .into_ref();
        assert!(!handler.on_event(&icon));
    }
}
