#![forbid(unsafe_code)]

//! Failures inside interception callbacks are logged, never propagated.
//!
//! A capture layer records every tracing event so the tests can check
//! target, level and structured fields.
//!
//! Run:
//!   cargo test -p tilehook-core --test hook_error_logging

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use tracing_subscriber::layer::SubscriberExt;

use tilehook_core::{HostSymbols, HostValue, PanelController, StaticPreferences};
use tilehook_harness::{FakeSystemUi, Journal, RecordingFactory};

// ============================================================================
// Tracing Capture Infrastructure
// ============================================================================

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: tracing::Level,
    target: String,
    fields: HashMap<String, String>,
}

impl CapturedEvent {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Clone, Default)]
struct Capture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct FieldVisitor(HashMap<String, String>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Capture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor(HashMap::new());
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            fields: visitor.0,
        });
    }
}

fn capture<F: FnOnce()>(f: F) -> Vec<CapturedEvent> {
    let layer = Capture::default();
    let events = Arc::clone(&layer.events);
    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, f);
    let captured = events.lock().unwrap().clone();
    captured
}

fn controller(ui: &FakeSystemUi, factory: RecordingFactory) -> PanelController {
    let controller = PanelController::new(
        ui.symbols().clone(),
        Box::new(StaticPreferences::default()),
        Box::new(factory),
    )
    .unwrap();
    controller.install(ui.runtime().as_ref());
    controller
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn malformed_set_tiles_is_logged_by_the_hook_guard() {
    let ui = FakeSystemUi::new();
    let controller = controller(&ui, RecordingFactory::new(Rc::new(Journal::default())));
    let panel = ui.construct_panel();

    let events = capture(|| {
        // The host's own body rejects the argument too; only the hook log matters.
        let _ = panel.call("setTiles", &[HostValue::Int(7)]);
    });

    let failure = events
        .iter()
        .find(|e| e.target == "tilehook.hook" && e.level == tracing::Level::ERROR)
        .expect("hook failure logged");
    assert_eq!(failure.field("hook"), Some("set_tiles"));
    assert!(failure.field("error").is_some_and(|e| e.contains("setTiles")));
    assert!(controller.registered_keys().is_empty());
}

#[test]
fn wrapper_failures_carry_key_and_operation() {
    let ui = FakeSystemUi::new();
    let factory = RecordingFactory::new(Rc::new(Journal::default()))
        .failing_create("bt")
        .panicking_create("cell");
    let controller = controller(&ui, factory);
    ui.construct_panel();

    let events = capture(|| {
        ui.set_tiles(&["wifi", "bt", "cell"]).unwrap();
    });

    let errors: Vec<&CapturedEvent> = events
        .iter()
        .filter(|e| e.target == "tilehook.registry" && e.level == tracing::Level::ERROR)
        .collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].field("key"), Some("bt"));
    assert_eq!(errors[1].field("key"), Some("cell"));
    assert!(errors[1].field("error").is_some_and(|e| e.contains("panicked")));
    assert!(errors.iter().all(|e| e.field("operation").is_some()));

    // Nothing escaped to the hook guard.
    assert!(
        !events
            .iter()
            .any(|e| e.target == "tilehook.hook" && e.level == tracing::Level::ERROR)
    );
    assert_eq!(controller.registered_keys(), vec!["wifi"]);
}

#[test]
fn missing_essential_site_warns_and_optional_site_is_quiet() {
    let symbols = HostSymbols::default();
    let ui = FakeSystemUi::without(&[
        symbols.tile_layout_type.as_str(),
        symbols.tile_view_type.as_str(),
    ]);
    let controller = PanelController::new(
        symbols.clone(),
        Box::new(StaticPreferences::default()),
        Box::new(RecordingFactory::new(Rc::new(Journal::default()))),
    )
    .unwrap();

    let events = capture(|| {
        controller.install(ui.runtime().as_ref());
    });

    let warnings: Vec<&CapturedEvent> = events
        .iter()
        .filter(|e| e.target == "tilehook.hook" && e.level == tracing::Level::WARN)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(
        warnings[0]
            .field("site")
            .is_some_and(|s| s.starts_with(&symbols.tile_layout_type))
    );
    assert!(events.iter().any(|e| {
        e.level == tracing::Level::DEBUG
            && e.field("site")
                .is_some_and(|s| s.starts_with(&symbols.tile_view_type))
    }));
}

struct PanickingListener;

impl tilehook_core::TileEventListener for PanickingListener {
    fn on_tile_event(&self, _event: &tilehook_core::TileEvent) {
        panic!("listener exploded");
    }
}

#[test]
fn listener_panic_is_logged_with_key() {
    let ui = FakeSystemUi::new();
    let controller = controller(&ui, RecordingFactory::new(Rc::new(Journal::default())));
    ui.construct_panel();
    ui.set_tiles(&["wifi"]).unwrap();
    controller
        .distributor()
        .unwrap()
        .subscribe("pulldown", Rc::new(PanickingListener));

    let events = capture(|| {
        controller.on_config_changed(&tilehook_core::ConfigDelta::hide_brightness(true));
    });

    let failure = events
        .iter()
        .find(|e| e.target == "tilehook.events" && e.level == tracing::Level::ERROR)
        .expect("listener failure logged");
    assert_eq!(failure.field("key"), Some("pulldown"));
    assert_eq!(failure.field("operation"), Some("dispatch"));
    assert!(failure.field("error").is_some_and(|e| e.contains("listener exploded")));
    assert!(controller.config().hide_brightness_slider);
}
