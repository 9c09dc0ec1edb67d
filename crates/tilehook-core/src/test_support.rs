//! Minimal host object for unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::HostError;
use crate::host::{HostObject, HostRef, HostValue};

/// A host object that is just a bag of fields. `getVisibility` and
/// `setVisibility` are backed by the `visibility` field; every other method
/// returns null unless marked as failing. All calls are recorded.
pub(crate) struct FieldBag {
    type_name: String,
    fields: RefCell<HashMap<String, HostValue>>,
    failing: HashSet<String>,
    calls: Rc<RefCell<Vec<String>>>,
}

impl FieldBag {
    pub(crate) fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: RefCell::new(HashMap::new()),
            failing: HashSet::new(),
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub(crate) fn with(self, name: &str, value: impl Into<HostValue>) -> Self {
        self.fields.borrow_mut().insert(name.to_string(), value.into());
        self
    }

    pub(crate) fn failing(mut self, method: &str) -> Self {
        self.failing.insert(method.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.calls)
    }

    pub(crate) fn into_ref(self) -> HostRef {
        HostRef::new(Rc::new(self))
    }
}

impl HostObject for FieldBag {
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
        if self.failing.contains(method) {
            return Err(HostError::Invocation {
                type_name: self.type_name.clone(),
                method: method.to_string(),
                message: "injected failure".into(),
            });
        }
        match method {
            "getVisibility" => Ok(self
                .fields
                .borrow()
                .get("visibility")
                .cloned()
                .unwrap_or(HostValue::Int(0))),
            "setVisibility" => {
                let value = args.first().cloned().unwrap_or_default();
                self.fields.borrow_mut().insert("visibility".into(), value);
                Ok(HostValue::Null)
            }
            _ => Ok(HostValue::Null),
        }
    }
}
