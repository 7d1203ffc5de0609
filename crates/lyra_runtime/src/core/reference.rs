//! References: the sum of everything an expression can designate.
//!
//! A reference is a root plus a stack of subscript modifiers. Reads walk
//! the stack without side effects; writes walk it in open mode, which
//! materializes missing structure the way assignment targets require.

use std::mem;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::core::collector::{Collector, VarId};
use crate::core::ptc::PtcArguments;
use crate::core::value::Value;
use crate::errors::{ErrorKind, RuntimeError};

/// What a reference designates before any modifiers apply.
#[derive(Clone, Default)]
pub enum RefRoot {
    /// No value at all; reading is an error. Distinct from a null value.
    #[default]
    Uninit,
    /// Deliberately absent result, e.g. of a function returning nothing.
    Void,
    /// A materialized value owned by the reference itself. Not an lvalue.
    Temporary(Value),
    /// A collector-managed variable.
    Variable(VarId),
    /// A pending proper tail call, resolved by `finish_call`.
    PtcArgs(Rc<PtcArguments>),
}

/// One subscript applied on top of the root.
#[derive(Clone, Debug, PartialEq)]
pub enum Modifier {
    /// Signed element index; negative counts back from the end.
    ArrayIndex(i64),
    ObjectKey(String),
    /// Insertion point before the first element. Write-only.
    ArrayHead,
    /// Insertion point past the last element. Write-only.
    ArrayTail,
}

impl Modifier {
    /// Resolves a signed index against `len`, wrapping negatives once.
    fn wrap_index(index: i64, len: usize) -> i64 {
        if index < 0 { index + len as i64 } else { index }
    }

    /// Read mode: no mutation, absent elements are errors.
    fn apply_read<'a>(&self, parent: &'a Value) -> Result<&'a Value, RuntimeError> {
        match self {
            Modifier::ArrayIndex(index) => {
                let Value::Array(arr) = parent else {
                    return Err(RuntimeError::new(
                        ErrorKind::TypeMismatch,
                        format!("integer subscript applied to {}", parent.type_name()),
                    ));
                };
                let wrapped = Self::wrap_index(*index, arr.len());
                if wrapped < 0 || wrapped as usize >= arr.len() {
                    return Err(RuntimeError::new(
                        ErrorKind::IndexOutOfRange,
                        format!("array index `{}` out of range (length {})", index, arr.len()),
                    ));
                }
                Ok(&arr[wrapped as usize])
            }
            Modifier::ObjectKey(key) => {
                let Value::Object(obj) = parent else {
                    return Err(RuntimeError::new(
                        ErrorKind::TypeMismatch,
                        format!("key subscript applied to {}", parent.type_name()),
                    ));
                };
                obj.get(key).ok_or_else(|| {
                    RuntimeError::new(
                        ErrorKind::KeyNotFound,
                        format!("key `{key}` not found in object"),
                    )
                })
            }
            Modifier::ArrayHead | Modifier::ArrayTail => Err(RuntimeError::new(
                ErrorKind::TypeMismatch,
                "array insertion points cannot be read",
            )),
        }
    }

    /// Open mode: materializes missing structure and yields a writable
    /// slot. A null parent becomes the container kind this modifier
    /// addresses.
    fn apply_open<'a>(&self, parent: &'a mut Value) -> Result<&'a mut Value, RuntimeError> {
        match self {
            Modifier::ArrayIndex(index) => {
                if parent.is_null() {
                    *parent = Value::Array(Vec::new());
                }
                let Value::Array(arr) = parent else {
                    return Err(RuntimeError::new(
                        ErrorKind::TypeMismatch,
                        format!("integer subscript applied to {}", parent.type_name()),
                    ));
                };
                let mut wrapped = Self::wrap_index(*index, arr.len());
                if wrapped < 0 {
                    // Prepend nulls; the addressed slot becomes the front.
                    for _ in wrapped..0 {
                        arr.insert(0, Value::Null);
                    }
                    wrapped = 0;
                } else if wrapped as usize >= arr.len() {
                    arr.resize_with(wrapped as usize + 1, Value::default);
                }
                Ok(&mut arr[wrapped as usize])
            }
            Modifier::ObjectKey(key) => {
                if parent.is_null() {
                    *parent = Value::Object(Default::default());
                }
                let Value::Object(obj) = parent else {
                    return Err(RuntimeError::new(
                        ErrorKind::TypeMismatch,
                        format!("key subscript applied to {}", parent.type_name()),
                    ));
                };
                Ok(obj.entry(key.clone()).or_default())
            }
            Modifier::ArrayHead => {
                if parent.is_null() {
                    *parent = Value::Array(Vec::new());
                }
                let Value::Array(arr) = parent else {
                    return Err(RuntimeError::new(
                        ErrorKind::TypeMismatch,
                        format!("head insertion applied to {}", parent.type_name()),
                    ));
                };
                arr.insert(0, Value::Null);
                Ok(&mut arr[0])
            }
            Modifier::ArrayTail => {
                if parent.is_null() {
                    *parent = Value::Array(Vec::new());
                }
                let Value::Array(arr) = parent else {
                    return Err(RuntimeError::new(
                        ErrorKind::TypeMismatch,
                        format!("tail insertion applied to {}", parent.type_name()),
                    ));
                };
                arr.push(Value::Null);
                Ok(arr.last_mut().unwrap())
            }
        }
    }

    /// Removes and returns the addressed element. Absent elements are
    /// errors, matching read mode.
    fn apply_unset(&self, parent: &mut Value) -> Result<Value, RuntimeError> {
        match self {
            Modifier::ArrayIndex(index) => {
                let Value::Array(arr) = parent else {
                    return Err(RuntimeError::new(
                        ErrorKind::TypeMismatch,
                        format!("integer subscript applied to {}", parent.type_name()),
                    ));
                };
                let wrapped = Self::wrap_index(*index, arr.len());
                if wrapped < 0 || wrapped as usize >= arr.len() {
                    return Err(RuntimeError::new(
                        ErrorKind::IndexOutOfRange,
                        format!("array index `{}` out of range (length {})", index, arr.len()),
                    ));
                }
                Ok(arr.remove(wrapped as usize))
            }
            Modifier::ObjectKey(key) => {
                let Value::Object(obj) = parent else {
                    return Err(RuntimeError::new(
                        ErrorKind::TypeMismatch,
                        format!("key subscript applied to {}", parent.type_name()),
                    ));
                };
                obj.shift_remove(key).ok_or_else(|| {
                    RuntimeError::new(
                        ErrorKind::KeyNotFound,
                        format!("key `{key}` not found in object"),
                    )
                })
            }
            Modifier::ArrayHead => {
                let Value::Array(arr) = parent else {
                    return Err(RuntimeError::new(
                        ErrorKind::TypeMismatch,
                        format!("head removal applied to {}", parent.type_name()),
                    ));
                };
                if arr.is_empty() {
                    return Err(RuntimeError::new(
                        ErrorKind::IndexOutOfRange,
                        "cannot remove the head of an empty array",
                    ));
                }
                Ok(arr.remove(0))
            }
            Modifier::ArrayTail => {
                let Value::Array(arr) = parent else {
                    return Err(RuntimeError::new(
                        ErrorKind::TypeMismatch,
                        format!("tail removal applied to {}", parent.type_name()),
                    ));
                };
                arr.pop().ok_or_else(|| {
                    RuntimeError::new(
                        ErrorKind::IndexOutOfRange,
                        "cannot remove the tail of an empty array",
                    )
                })
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct Reference {
    root: RefRoot,
    mods: SmallVec<[Modifier; 2]>,
}

impl Reference {
    pub fn uninit() -> Self {
        Self::default()
    }

    pub fn void() -> Self {
        Self {
            root: RefRoot::Void,
            mods: SmallVec::new(),
        }
    }

    pub fn temporary(value: Value) -> Self {
        Self {
            root: RefRoot::Temporary(value),
            mods: SmallVec::new(),
        }
    }

    pub fn variable(id: VarId) -> Self {
        Self {
            root: RefRoot::Variable(id),
            mods: SmallVec::new(),
        }
    }

    pub fn ptc(args: Rc<PtcArguments>) -> Self {
        Self {
            root: RefRoot::PtcArgs(args),
            mods: SmallVec::new(),
        }
    }

    pub fn is_uninit(&self) -> bool {
        matches!(self.root, RefRoot::Uninit)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.root, RefRoot::Void)
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.root, RefRoot::Temporary(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.root, RefRoot::Variable(_))
    }

    pub fn is_ptc(&self) -> bool {
        matches!(self.root, RefRoot::PtcArgs(_))
    }

    pub(crate) fn take_ptc_args(&mut self) -> Option<Rc<PtcArguments>> {
        if self.is_ptc() {
            match mem::take(&mut self.root) {
                RefRoot::PtcArgs(args) => Some(args),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }

    pub fn push_modifier_array_index(&mut self, index: i64) {
        self.mods.push(Modifier::ArrayIndex(index));
    }

    pub fn push_modifier_object_key(&mut self, key: impl Into<String>) {
        self.mods.push(Modifier::ObjectKey(key.into()));
    }

    pub fn push_modifier_array_head(&mut self) {
        self.mods.push(Modifier::ArrayHead);
    }

    pub fn push_modifier_array_tail(&mut self) {
        self.mods.push(Modifier::ArrayTail);
    }

    /// Drops the top modifier. With an empty stack the whole reference
    /// collapses to a null temporary; this is never an error.
    pub fn pop_modifier(&mut self) {
        if self.mods.pop().is_none() {
            *self = Self::temporary(Value::Null);
        }
    }

    pub fn count_modifiers(&self) -> usize {
        self.mods.len()
    }

    fn unbound_error(&self) -> RuntimeError {
        let message = match self.root {
            RefRoot::Uninit => "reference is uninitialized",
            RefRoot::Void => "reference is void",
            RefRoot::PtcArgs(_) => "tail call has not been resolved",
            _ => "reference is unbound",
        };
        RuntimeError::new(ErrorKind::UnboundReference, message)
    }

    /// Resolves the reference for reading. No mutation takes place;
    /// absent elements and wrong container types are errors.
    pub fn dereference_readonly<'a>(
        &'a self,
        heap: &'a Collector,
    ) -> Result<&'a Value, RuntimeError> {
        let mut cur = match &self.root {
            RefRoot::Temporary(value) => value,
            RefRoot::Variable(id) => heap.get(*id).value(),
            RefRoot::Uninit | RefRoot::Void | RefRoot::PtcArgs(_) => {
                return Err(self.unbound_error());
            }
        };
        for modifier in &self.mods {
            cur = modifier.apply_read(cur)?;
        }
        Ok(cur)
    }

    /// Resolves the reference for writing, materializing missing
    /// structure along the way. Only a mutable variable is an lvalue.
    pub fn dereference_mutable<'a>(
        &self,
        heap: &'a mut Collector,
    ) -> Result<&'a mut Value, RuntimeError> {
        let mut cur = match &self.root {
            RefRoot::Variable(id) => heap.get_mut(*id).open_value()?,
            RefRoot::Temporary(_) => {
                return Err(RuntimeError::new(
                    ErrorKind::ImmutableTarget,
                    "temporary values are not lvalues",
                ));
            }
            RefRoot::Uninit | RefRoot::Void | RefRoot::PtcArgs(_) => {
                return Err(self.unbound_error());
            }
        };
        for modifier in &self.mods {
            cur = modifier.apply_open(cur)?;
        }
        Ok(cur)
    }

    /// Collapses the reference to an owned temporary of its current
    /// value and returns a mutable handle to it.
    pub fn mutate_into_temporary(
        &mut self,
        heap: &Collector,
    ) -> Result<&mut Value, RuntimeError> {
        let value = self.dereference_readonly(heap)?.clone();
        self.mods.clear();
        self.root = RefRoot::Temporary(value);
        match &mut self.root {
            RefRoot::Temporary(value) => Ok(value),
            _ => unreachable!(),
        }
    }

    /// Removes the designated element and returns it. With an empty
    /// modifier stack this detaches the reference's own binding instead:
    /// the root becomes void and the previously designated value is
    /// returned.
    pub fn dereference_unset(&mut self, heap: &mut Collector) -> Result<Value, RuntimeError> {
        let Some((last, parents)) = self.mods.split_last() else {
            match &self.root {
                RefRoot::Temporary(_) => {
                    let RefRoot::Temporary(value) = mem::replace(&mut self.root, RefRoot::Void)
                    else {
                        unreachable!()
                    };
                    return Ok(value);
                }
                RefRoot::Variable(id) => {
                    let value = heap.get(*id).value().clone();
                    self.root = RefRoot::Void;
                    return Ok(value);
                }
                RefRoot::Uninit | RefRoot::Void | RefRoot::PtcArgs(_) => {
                    return Err(self.unbound_error());
                }
            }
        };
        let mut cur = match &self.root {
            RefRoot::Variable(id) => heap.get_mut(*id).open_value()?,
            RefRoot::Temporary(_) => {
                return Err(RuntimeError::new(
                    ErrorKind::ImmutableTarget,
                    "temporary values are not lvalues",
                ));
            }
            RefRoot::Uninit | RefRoot::Void | RefRoot::PtcArgs(_) => {
                return Err(self.unbound_error());
            }
        };
        for modifier in parents {
            cur = modifier.apply_open(cur)?;
        }
        last.apply_unset(cur)
    }

    /// Visits every variable handle this reference keeps alive.
    pub fn enumerate_variables(&self, visit: &mut dyn FnMut(VarId)) {
        match &self.root {
            RefRoot::Variable(id) => visit(*id),
            RefRoot::Temporary(value) => value.enumerate_variables(visit),
            RefRoot::PtcArgs(args) => args.enumerate_variables(visit),
            RefRoot::Uninit | RefRoot::Void => {}
        }
    }
}
