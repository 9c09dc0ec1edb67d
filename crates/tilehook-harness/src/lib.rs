#![forbid(unsafe_code)]

//! Test harness for `tilehook-core`.
//!
//! # Role
//! Provides an in-memory host to drive a
//! [`PanelController`](tilehook_core::PanelController) end to end without a
//! real interception framework.
//!
//! # Key components
//! - [`HostRuntime`]: hook table and type catalogue. Implements
//!   [`Interceptor`](tilehook_core::Interceptor) and routes every method call
//!   on a [`FakeObject`] through registered hooks.
//! - [`FakeSystemUi`]: a scripted quick-settings host built on the runtime.
//! - [`RecordingFactory`]: wrapper factory that journals every lifecycle
//!   call.

pub mod factory;
pub mod runtime;
pub mod systemui;

pub use factory::{Journal, RecordingFactory, WrapperEvent};
pub use runtime::{FakeObject, HostRuntime, MethodBody, ObjectBuilder};
pub use systemui::{FakeSystemUi, Geometry};
