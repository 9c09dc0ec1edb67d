#![forbid(unsafe_code)]

//! Typed capability interface over opaque host objects.
//!
//! The core never assumes anything about a host object's layout. Everything
//! it needs (reading a field, writing a field, invoking a method) goes
//! through [`HostObject`], which the interception layer implements for the
//! live objects it hands to callbacks.
//!
//! [`HostRef`] is the shared handle passed around the core. Equality on
//! handles is *identity*: two handles are equal when they point at the same
//! host instance, which is what "`this == panel`" checks need.
//!
//! All handles are `Rc` based. Interception callbacks run on the host's UI
//! thread, so nothing here is `Send`.

use std::fmt;
use std::rc::Rc;

use crate::error::HostError;

/// A value crossing the host boundary: field contents, call arguments and
/// return values.
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Str(String),
    Object(HostRef),
    List(Vec<HostValue>),
    Intent(Intent),
    Callback(Rc<dyn ViewCallback>),
}

impl HostValue {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Intent(_) => "intent",
            Self::Callback(_) => "callback",
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// `Null` maps to `None`, objects to `Some`. Other variants are `None`.
    #[must_use]
    pub fn as_object(&self) -> Option<&HostRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[HostValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_intent(&self) -> Option<&Intent> {
        match self {
            Self::Intent(i) => Some(i),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Object(o) => write!(f, "Object({})", o.type_name()),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Intent(i) => write!(f, "Intent({:?})", i.action),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Intent(a), Self::Intent(b)) => a == b,
            (Self::Callback(a), Self::Callback(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<HostRef> for HostValue {
    fn from(v: HostRef) -> Self {
        Self::Object(v)
    }
}

impl From<Intent> for HostValue {
    fn from(v: Intent) -> Self {
        Self::Intent(v)
    }
}

/// A host-side request to perform an action, identified by an action string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub action: String,
}

impl Intent {
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }
}

/// A handler the core hands to a host view (click or long-press).
///
/// Returns whether the event was handled. Implementations must not panic
/// into the host; they catch and log their own failures.
pub trait ViewCallback {
    fn on_event(&self, view: &HostRef) -> bool;
}

/// Capability interface every intercepted host object exposes.
pub trait HostObject {
    /// Exact runtime type name of the instance (not a supertype).
    fn type_name(&self) -> &str;

    /// Read a named field.
    fn field(&self, name: &str) -> Result<HostValue, HostError>;

    /// Overwrite a named field.
    fn set_field(&self, name: &str, value: HostValue) -> Result<(), HostError>;

    /// Invoke a named method. Intercepted methods run their registered hooks.
    fn invoke(&self, method: &str, args: &[HostValue]) -> Result<HostValue, HostError>;
}

/// Shared identity handle to a host object.
#[derive(Clone)]
pub struct HostRef(Rc<dyn HostObject>);

impl HostRef {
    pub fn new(object: Rc<dyn HostObject>) -> Self {
        Self(object)
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.0.type_name()
    }

    /// Identity comparison.
    #[must_use]
    pub fn same(&self, other: &HostRef) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    pub fn field(&self, name: &str) -> Result<HostValue, HostError> {
        self.0.field(name)
    }

    pub fn set_field(&self, name: &str, value: impl Into<HostValue>) -> Result<(), HostError> {
        self.0.set_field(name, value.into())
    }

    pub fn call(&self, method: &str, args: &[HostValue]) -> Result<HostValue, HostError> {
        self.0.invoke(method, args)
    }

    pub fn int_field(&self, name: &str) -> Result<i32, HostError> {
        self.field(name)?
            .as_int()
            .ok_or_else(|| self.field_type(name, "int"))
    }

    pub fn set_int_field(&self, name: &str, value: i32) -> Result<(), HostError> {
        self.set_field(name, HostValue::Int(value))
    }

    pub fn bool_field(&self, name: &str) -> Result<bool, HostError> {
        self.field(name)?
            .as_bool()
            .ok_or_else(|| self.field_type(name, "bool"))
    }

    pub fn str_field(&self, name: &str) -> Result<String, HostError> {
        match self.field(name)? {
            HostValue::Str(s) => Ok(s),
            _ => Err(self.field_type(name, "string")),
        }
    }

    /// Object-valued field; a `Null` field is `Ok(None)`.
    pub fn object_field(&self, name: &str) -> Result<Option<HostRef>, HostError> {
        match self.field(name)? {
            HostValue::Null => Ok(None),
            HostValue::Object(o) => Ok(Some(o)),
            _ => Err(self.field_type(name, "object")),
        }
    }

    pub fn list_field(&self, name: &str) -> Result<Vec<HostValue>, HostError> {
        match self.field(name)? {
            HostValue::List(items) => Ok(items),
            _ => Err(self.field_type(name, "list")),
        }
    }

    pub fn call_bool(&self, method: &str, args: &[HostValue]) -> Result<bool, HostError> {
        let value = self.call(method, args)?;
        value.as_bool().ok_or(HostError::ReturnType {
            method: method.to_string(),
            expected: "bool",
            found: value.kind(),
        })
    }

    pub fn call_int(&self, method: &str, args: &[HostValue]) -> Result<i32, HostError> {
        let value = self.call(method, args)?;
        value.as_int().ok_or(HostError::ReturnType {
            method: method.to_string(),
            expected: "int",
            found: value.kind(),
        })
    }

    pub fn call_object(&self, method: &str, args: &[HostValue]) -> Result<HostRef, HostError> {
        let value = self.call(method, args)?;
        match value {
            HostValue::Object(o) => Ok(o),
            other => Err(HostError::ReturnType {
                method: method.to_string(),
                expected: "object",
                found: other.kind(),
            }),
        }
    }

    fn field_type(&self, field: &str, expected: &'static str) -> HostError {
        HostError::FieldType {
            type_name: self.type_name().to_string(),
            field: field.to_string(),
            expected,
        }
    }
}

impl PartialEq for HostRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for HostRef {}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostRef").field(&self.type_name()).finish()
    }
}

/// View visibility as the host encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Invisible,
    Gone,
}

impl Visibility {
    #[must_use]
    pub const fn to_host(self) -> i32 {
        match self {
            Self::Visible => 0,
            Self::Invisible => 4,
            Self::Gone => 8,
        }
    }

    #[must_use]
    pub const fn from_host(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Visible),
            4 => Some(Self::Invisible),
            8 => Some(Self::Gone),
            _ => None,
        }
    }

    #[must_use]
    pub const fn shown_if(visible: bool) -> Self {
        if visible { Self::Visible } else { Self::Gone }
    }
}

/// Read a view's visibility through `getVisibility`.
pub fn view_visibility(view: &HostRef) -> Result<Visibility, HostError> {
    let raw = view.call_int("getVisibility", &[])?;
    Visibility::from_host(raw).ok_or_else(|| HostError::Invocation {
        type_name: view.type_name().to_string(),
        method: "getVisibility".into(),
        message: format!("unknown visibility value {raw}"),
    })
}

/// Set a view's visibility through `setVisibility`.
pub fn set_view_visibility(view: &HostRef, visibility: Visibility) -> Result<(), HostError> {
    view.call("setVisibility", &[HostValue::Int(visibility.to_host())])
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FieldBag;

    #[test]
    fn handles_compare_by_identity() {
        let a = FieldBag::new("Panel").into_ref();
        let b = FieldBag::new("Panel").into_ref();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn typed_field_accessors_report_mismatch() {
        let obj = FieldBag::new("TileLayout")
            .with("mCellWidth", 100)
            .with("mTitle", "grid")
            .into_ref();
        assert_eq!(obj.int_field("mCellWidth"), Ok(100));
        let err = obj.int_field("mTitle").unwrap_err();
        assert!(matches!(err, HostError::FieldType { expected: "int", .. }));
        let err = obj.int_field("mMissing").unwrap_err();
        assert!(matches!(err, HostError::MissingField { .. }));
    }

    #[test]
    fn null_object_field_is_none() {
        let obj = FieldBag::new("Panel").with("mBrightnessView", HostValue::Null).into_ref();
        assert_eq!(obj.object_field("mBrightnessView"), Ok(None));
    }

    #[test]
    fn visibility_round_trips_host_encoding() {
        for v in [Visibility::Visible, Visibility::Invisible, Visibility::Gone] {
            assert_eq!(Visibility::from_host(v.to_host()), Some(v));
        }
        assert_eq!(Visibility::from_host(3), None);
        assert_eq!(Visibility::shown_if(false), Visibility::Gone);
    }
}
