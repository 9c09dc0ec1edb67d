#![forbid(unsafe_code)]

//! In-memory host runtime.
//!
//! Host objects are [`FakeObject`]s: a bag of fields plus named method
//! bodies. Every [`HostObject::invoke`] is routed through the
//! [`HostRuntime`], which runs registered before-hooks, the body (unless a
//! before-hook replaced the result), then after-hooks. Method bodies that
//! invoke other methods therefore re-enter hooks exactly as a real host
//! would.
//!
//! Types must be declared before hooks can attach to them; undeclared types
//! or overloads fail installation with [`AttachError`], which is how host
//! version mismatches are simulated.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tilehook_core::{
    AttachError, HookSite, HostError, HostObject, HostRef, HostValue, Interceptor, MethodHook,
    MethodHookParam,
};

/// A method implementation on a fake object.
pub type MethodBody = Rc<dyn Fn(&HostRef, &[HostValue]) -> Result<HostValue, HostError>>;

#[derive(Debug, Clone, Default)]
struct TypeInfo {
    parent: Option<String>,
    /// method name -> parameter type lists (one per overload)
    methods: HashMap<String, Vec<Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HookKey {
    type_name: String,
    method: Option<String>,
}

/// Hook table and type catalogue of the fake host.
#[derive(Default)]
pub struct HostRuntime {
    types: RefCell<HashMap<String, TypeInfo>>,
    hooks: RefCell<HashMap<HookKey, Vec<Rc<MethodHook>>>>,
}

impl HostRuntime {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Declare a type, optionally as a subtype of `parent`.
    pub fn declare_type(&self, type_name: &str, parent: Option<&str>) {
        self.types.borrow_mut().insert(
            type_name.to_string(),
            TypeInfo {
                parent: parent.map(str::to_string),
                methods: HashMap::new(),
            },
        );
    }

    /// Declare a hookable method overload on an already declared type.
    pub fn declare_method(&self, type_name: &str, method: &str, params: &[&str]) {
        if let Some(info) = self.types.borrow_mut().get_mut(type_name) {
            info.methods
                .entry(method.to_string())
                .or_default()
                .push(params.iter().map(|p| (*p).to_string()).collect());
        }
    }

    /// Start building an object of `type_name`.
    pub fn object(self: &Rc<Self>, type_name: &str) -> ObjectBuilder {
        ObjectBuilder {
            runtime: Rc::clone(self),
            type_name: type_name.to_string(),
            fields: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    /// Number of hooks installed at `site`.
    #[must_use]
    pub fn hook_count(&self, site: &HookSite) -> usize {
        let key = HookKey {
            type_name: site.type_name.clone(),
            method: site.method.clone(),
        };
        self.hooks.borrow().get(&key).map_or(0, Vec::len)
    }

    fn hooks_for(&self, type_name: &str, method: Option<&str>) -> Vec<Rc<MethodHook>> {
        let key = HookKey {
            type_name: type_name.to_string(),
            method: method.map(str::to_string),
        };
        self.hooks.borrow().get(&key).cloned().unwrap_or_default()
    }

    /// Type chain from `type_name` up through its declared parents.
    fn lineage(&self, type_name: &str) -> Vec<String> {
        let types = self.types.borrow();
        let mut chain = vec![type_name.to_string()];
        let mut current = types.get(type_name).and_then(|t| t.parent.clone());
        while let Some(parent) = current {
            current = types.get(&parent).and_then(|t| t.parent.clone());
            chain.push(parent);
        }
        chain
    }

    fn dispatch(
        &self,
        this: &HostRef,
        method: &str,
        args: &[HostValue],
        body: Option<MethodBody>,
    ) -> Result<HostValue, HostError> {
        // Methods are inherited, so hooks on any ancestor apply.
        let hooks: Vec<Rc<MethodHook>> = self
            .lineage(this.type_name())
            .iter()
            .flat_map(|t| self.hooks_for(t, Some(method)))
            .collect();

        let mut before = MethodHookParam::new(this.clone(), args, None);
        for hook in &hooks {
            if let Some(cb) = &hook.before {
                cb(&mut before);
            }
        }
        let result = match before.into_result() {
            Some(replaced) => replaced,
            None => match body {
                Some(body) => body(this, args)?,
                None => HostValue::Null,
            },
        };

        let mut after = MethodHookParam::new(this.clone(), args, Some(result));
        for hook in &hooks {
            if let Some(cb) = &hook.after {
                cb(&mut after);
            }
        }
        Ok(after.into_result().unwrap_or_default())
    }

    fn run_constructor_hooks(&self, this: &HostRef) {
        for type_name in self.lineage(this.type_name()) {
            for hook in self.hooks_for(&type_name, None) {
                let mut param = MethodHookParam::new(this.clone(), &[], None);
                if let Some(cb) = &hook.before {
                    cb(&mut param);
                }
                if let Some(cb) = &hook.after {
                    cb(&mut param);
                }
            }
        }
    }
}

impl Interceptor for HostRuntime {
    fn install(&self, site: &HookSite, hook: MethodHook) -> Result<(), AttachError> {
        {
            let types = self.types.borrow();
            let info = types.get(&site.type_name).ok_or_else(|| AttachError::TypeNotFound {
                type_name: site.type_name.clone(),
            })?;
            if let Some(method) = &site.method {
                let found = info
                    .methods
                    .get(method)
                    .is_some_and(|overloads| overloads.contains(&site.params));
                if !found {
                    return Err(AttachError::MethodNotFound {
                        type_name: site.type_name.clone(),
                        method: method.clone(),
                        params: site.params.join(", "),
                    });
                }
            }
        }
        tracing::trace!(target: "tilehook.harness", %site, "hook installed");
        let key = HookKey {
            type_name: site.type_name.clone(),
            method: site.method.clone(),
        };
        self.hooks
            .borrow_mut()
            .entry(key)
            .or_default()
            .push(Rc::new(hook));
        Ok(())
    }
}

impl fmt::Debug for HostRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<String> = self.types.borrow().keys().cloned().collect();
        types.sort();
        f.debug_struct("HostRuntime")
            .field("types", &types)
            .field("hook_sites", &self.hooks.borrow().len())
            .finish()
    }
}

/// Builder for a [`FakeObject`].
pub struct ObjectBuilder {
    runtime: Rc<HostRuntime>,
    type_name: String,
    fields: HashMap<String, HostValue>,
    methods: HashMap<String, MethodBody>,
}

impl ObjectBuilder {
    #[must_use]
    pub fn field(mut self, name: &str, value: impl Into<HostValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn method<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&HostRef, &[HostValue]) -> Result<HostValue, HostError> + 'static,
    {
        self.methods.insert(name.to_string(), Rc::new(body));
        self
    }

    /// Create the object without running constructor hooks.
    pub fn build(self) -> Rc<FakeObject> {
        let runtime = Rc::downgrade(&self.runtime);
        Rc::new_cyclic(|this| FakeObject {
            type_name: self.type_name,
            runtime,
            this: this.clone(),
            fields: RefCell::new(self.fields),
            methods: RefCell::new(self.methods),
            calls: RefCell::new(Vec::new()),
        })
    }

    /// Create the object and run constructor hooks for its type lineage.
    pub fn construct(self) -> Rc<FakeObject> {
        let runtime = Rc::clone(&self.runtime);
        let object = self.build();
        runtime.run_constructor_hooks(&object.handle());
        object
    }
}

/// A host object living in a [`HostRuntime`].
///
/// `getVisibility`/`setVisibility` default to the `visibility` field when no
/// body is registered.
pub struct FakeObject {
    type_name: String,
    runtime: Weak<HostRuntime>,
    this: Weak<FakeObject>,
    fields: RefCell<HashMap<String, HostValue>>,
    methods: RefCell<HashMap<String, MethodBody>>,
    calls: RefCell<Vec<String>>,
}

impl FakeObject {
    /// Identity handle for this object.
    ///
    /// # Panics
    ///
    /// Never while a caller holds the `Rc<FakeObject>`.
    #[must_use]
    pub fn handle(&self) -> HostRef {
        let rc: Rc<dyn HostObject> = self.this.upgrade().expect("object is alive");
        HostRef::new(rc)
    }

    /// Names of every method invoked on this object, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.borrow().iter().filter(|m| *m == method).count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Replace or add a method body after construction.
    pub fn set_method<F>(&self, name: &str, body: F)
    where
        F: Fn(&HostRef, &[HostValue]) -> Result<HostValue, HostError> + 'static,
    {
        self.methods.borrow_mut().insert(name.to_string(), Rc::new(body));
    }

    /// Direct field read for assertions.
    #[must_use]
    pub fn get(&self, name: &str) -> HostValue {
        self.fields.borrow().get(name).cloned().unwrap_or_default()
    }

    /// Integer field for assertions; `0` when absent.
    #[must_use]
    pub fn int(&self, name: &str) -> i32 {
        self.get(name).as_int().unwrap_or(0)
    }

    /// Direct field write that bypasses hooks.
    pub fn put(&self, name: &str, value: impl Into<HostValue>) {
        self.fields.borrow_mut().insert(name.to_string(), value.into());
    }

    fn default_body(method: &str) -> Option<MethodBody> {
        match method {
            "getVisibility" => Some(Rc::new(|this: &HostRef, _args: &[HostValue]| {
                match this.field("visibility") {
                    Ok(value) => Ok(value),
                    Err(_) => Ok(HostValue::Int(0)),
                }
            })),
            "setVisibility" => Some(Rc::new(|this: &HostRef, args: &[HostValue]| {
                let value = args.first().cloned().unwrap_or_default();
                this.set_field("visibility", value)?;
                Ok(HostValue::Null)
            })),
            _ => None,
        }
    }
}

impl HostObject for FakeObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field(&self, name: &str) -> Result<HostValue, HostError> {
        self.fields
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| HostError::MissingField {
                type_name: self.type_name.clone(),
                field: name.to_string(),
            })
    }

    fn set_field(&self, name: &str, value: HostValue) -> Result<(), HostError> {
        self.fields.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    fn invoke(&self, method: &str, args: &[HostValue]) -> Result<HostValue, HostError> {
        self.calls.borrow_mut().push(method.to_string());
        let body = self
            .methods
            .borrow()
            .get(method)
            .cloned()
            .or_else(|| Self::default_body(method));
        let this = self.handle();
        match self.runtime.upgrade() {
            Some(runtime) => runtime.dispatch(&this, method, args, body),
            None => match body {
                Some(body) => body(&this, args),
                None => Ok(HostValue::Null),
            },
        }
    }
}

impl fmt::Debug for FakeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<String> = self.fields.borrow().keys().cloned().collect();
        fields.sort();
        f.debug_struct("FakeObject")
            .field("type_name", &self.type_name)
            .field("fields", &fields)
            .finish()
    }
}
