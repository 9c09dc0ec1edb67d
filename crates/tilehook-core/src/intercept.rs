#![forbid(unsafe_code)]

//! Interception capability contract.
//!
//! The mechanism that actually attaches to host methods lives outside this
//! crate. What the core consumes is the contract expressed by [`Interceptor`]:
//! for a named host type and method signature, register callbacks that fire
//! before and/or after the call, with access to the instance, the arguments,
//! and the ability to replace the return value or skip the original body.
//!
//! # Guarding
//!
//! Callbacks are written as fallible closures (`Result<(), Error>`). Before a
//! callback is handed to the interceptor it is wrapped by [`guarded`], which
//! converts both `Err` values and panics into a single `error` event on the
//! `tilehook.hook` target. A failing callback must never unwind into the host.
//!
//! # Threading
//!
//! Hooks fire synchronously on the host's UI thread. Callbacks are `Fn` and
//! not `Send`; state shared between them uses `Rc<RefCell<_>>`. A host that
//! delivers calls from another thread must marshal them onto the owning
//! thread before invoking any hook.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::{AttachError, Error};
use crate::host::{HostRef, HostValue};

/// A host method (or all constructors of a type) that can be intercepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookSite {
    pub type_name: String,
    /// `None` selects every constructor of the type.
    pub method: Option<String>,
    /// Parameter type names, used to pick an overload.
    pub params: Vec<String>,
}

impl HookSite {
    /// Every constructor of `type_name`.
    pub fn constructors(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method: None,
            params: Vec::new(),
        }
    }

    /// A specific method overload.
    pub fn method<I, S>(type_name: impl Into<String>, method: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            type_name: type_name.into(),
            method: Some(method.into()),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.method.is_none()
    }
}

impl fmt::Display for HookSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(m) => write!(f, "{}.{}({})", self.type_name, m, self.params.join(", ")),
            None => write!(f, "{}.<init>", self.type_name),
        }
    }
}

/// Per-invocation view handed to a hook.
#[derive(Debug)]
pub struct MethodHookParam<'a> {
    this: HostRef,
    args: &'a [HostValue],
    result: Option<HostValue>,
}

impl<'a> MethodHookParam<'a> {
    /// `result` carries the original return value for after-call hooks and
    /// should be `None` for before-call hooks.
    pub fn new(this: HostRef, args: &'a [HostValue], result: Option<HostValue>) -> Self {
        Self { this, args, result }
    }

    /// The intercepted instance.
    #[must_use]
    pub fn this(&self) -> &HostRef {
        &self.this
    }

    #[must_use]
    pub fn args(&self) -> &[HostValue] {
        self.args
    }

    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&HostValue> {
        self.args.get(index)
    }

    /// Current return value, if one has been produced or replaced.
    #[must_use]
    pub fn result(&self) -> Option<&HostValue> {
        self.result.as_ref()
    }

    /// Replace the method's return value. In a before-call hook this also
    /// skips the original method body.
    pub fn set_result(&mut self, value: impl Into<HostValue>) {
        self.result = Some(value.into());
    }

    /// Consume the param, yielding the replaced (or original) result.
    #[must_use]
    pub fn into_result(self) -> Option<HostValue> {
        self.result
    }
}

/// A guarded callback, as handed to the interceptor.
pub type HookFn = Box<dyn Fn(&mut MethodHookParam<'_>)>;

/// Before/after callback pair for one hook site.
#[derive(Default)]
pub struct MethodHook {
    pub before: Option<HookFn>,
    pub after: Option<HookFn>,
}

impl MethodHook {
    /// A hook with only a before-call callback, guarded under `label`.
    pub fn before<F>(label: &'static str, f: F) -> Self
    where
        F: Fn(&mut MethodHookParam<'_>) -> Result<(), Error> + 'static,
    {
        Self {
            before: Some(guarded(label, f)),
            after: None,
        }
    }

    /// A hook with only an after-call callback, guarded under `label`.
    pub fn after<F>(label: &'static str, f: F) -> Self
    where
        F: Fn(&mut MethodHookParam<'_>) -> Result<(), Error> + 'static,
    {
        Self {
            before: None,
            after: Some(guarded(label, f)),
        }
    }
}

impl fmt::Debug for MethodHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHook")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

/// The externally supplied attachment mechanism.
pub trait Interceptor {
    /// Install `hook` at `site`. Constructor sites match every constructor of
    /// the type. Fails when the host does not expose the type or overload.
    fn install(&self, site: &HookSite, hook: MethodHook) -> Result<(), AttachError>;
}

/// Wrap a fallible callback so that errors and panics are logged and
/// swallowed.
pub fn guarded<F>(label: &'static str, f: F) -> HookFn
where
    F: Fn(&mut MethodHookParam<'_>) -> Result<(), Error> + 'static,
{
    Box::new(move |param: &mut MethodHookParam<'_>| {
        let this = param.this().type_name().to_string();
        if let Err(err) = isolate(|| f(param)) {
            tracing::error!(
                target: "tilehook.hook",
                hook = label,
                this = %this,
                error = %err,
                "interception callback failed"
            );
        }
    })
}

/// Run `f`, turning a panic into [`Error::Panicked`].
pub fn isolate<T, F>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(Error::from_panic(payload.as_ref())),
    }
}

/// Outcome of installing a controller's hooks.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<HookSite>,
    pub failed: Vec<(HookSite, AttachError)>,
}

impl InstallReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    #[must_use]
    pub fn is_installed(&self, site: &HookSite) -> bool {
        self.installed.contains(site)
    }

    /// Install one hook, recording the outcome. `essential` sites log at
    /// `warn`, optional ones at `debug`.
    pub fn attach(
        &mut self,
        interceptor: &dyn Interceptor,
        site: HookSite,
        hook: MethodHook,
        essential: bool,
    ) {
        match interceptor.install(&site, hook) {
            Ok(()) => {
                tracing::debug!(target: "tilehook.hook", site = %site, "hook installed");
                self.installed.push(site);
            }
            Err(err) => {
                if essential {
                    tracing::warn!(
                        target: "tilehook.hook",
                        site = %site,
                        error = %err,
                        "hook not installed"
                    );
                } else {
                    tracing::debug!(
                        target: "tilehook.hook",
                        site = %site,
                        error = %err,
                        "optional hook not installed"
                    );
                }
                self.failed.push((site, err));
            }
        }
    }
}
