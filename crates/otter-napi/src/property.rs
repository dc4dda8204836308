//! Objects, arrays and property access

use std::ffi::{c_int, c_void};
use std::ops::BitOr;
use std::ptr;
use std::rc::Rc;

use crate::engine::{self, Atom, JSValue, Owned, qjs};
use crate::env::{Core, Env};
use crate::error::{NapiResult, Status};
use crate::function::Callback;
use crate::scope::Value;

/// Property attribute bits, valued like `napi_property_attributes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PropertyAttributes(u32);

impl PropertyAttributes {
    pub const DEFAULT: Self = Self(0);
    pub const WRITABLE: Self = Self(1);
    pub const ENUMERABLE: Self = Self(1 << 1);
    pub const CONFIGURABLE: Self = Self(1 << 2);
    /// Class properties only: define on the constructor instead of the prototype
    pub const STATIC: Self = Self(1 << 10);
    pub const DEFAULT_METHOD: Self = Self(Self::WRITABLE.0 | Self::CONFIGURABLE.0);
    pub const DEFAULT_JSPROPERTY: Self =
        Self(Self::WRITABLE.0 | Self::ENUMERABLE.0 | Self::CONFIGURABLE.0);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Engine flags for a data property
    fn data_flags(self) -> c_int {
        let mut flags = engine::PROP_THROW;
        if self.contains(Self::WRITABLE) {
            flags |= engine::PROP_WRITABLE;
        }
        self.accessor_flags(flags)
    }

    /// Engine flags for a getter/setter pair; accessors have no writable bit
    fn accessor_flags(self, mut flags: c_int) -> c_int {
        if self.contains(Self::ENUMERABLE) {
            flags |= engine::PROP_ENUMERABLE;
        }
        if self.contains(Self::CONFIGURABLE) {
            flags |= engine::PROP_CONFIGURABLE;
        }
        flags
    }
}

impl BitOr for PropertyAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Key of a described property
#[derive(Debug, Clone)]
pub enum PropertyKey {
    Name(String),
    /// A string or symbol handle
    Value(Value),
}

impl From<&str> for PropertyKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<Value> for PropertyKey {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// One entry of [`Env::define_properties`] or a class definition
///
/// Exactly one of a method, an accessor pair or a value should be set; a method wins
/// over accessors, and accessors win over a value.
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub key: PropertyKey,
    pub method: Option<Rc<Callback>>,
    pub getter: Option<Rc<Callback>>,
    pub setter: Option<Rc<Callback>>,
    pub value: Option<Value>,
    pub attributes: PropertyAttributes,
    /// Passed to the method and accessors through `CallbackInfo::data`
    pub data: *mut c_void,
}

impl PropertyDescriptor {
    fn new(key: impl Into<PropertyKey>, attributes: PropertyAttributes) -> Self {
        Self {
            key: key.into(),
            method: None,
            getter: None,
            setter: None,
            value: None,
            attributes,
            data: ptr::null_mut(),
        }
    }

    pub fn method(key: impl Into<PropertyKey>, callback: Rc<Callback>) -> Self {
        Self {
            method: Some(callback),
            ..Self::new(key, PropertyAttributes::DEFAULT_METHOD)
        }
    }

    pub fn accessor(
        key: impl Into<PropertyKey>,
        getter: Option<Rc<Callback>>,
        setter: Option<Rc<Callback>>,
    ) -> Self {
        Self {
            getter,
            setter,
            ..Self::new(key, PropertyAttributes::CONFIGURABLE)
        }
    }

    pub fn value(key: impl Into<PropertyKey>, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::new(key, PropertyAttributes::DEFAULT_JSPROPERTY)
        }
    }

    pub fn with_attributes(mut self, attributes: PropertyAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_data(mut self, data: *mut c_void) -> Self {
        self.data = data;
        self
    }

    pub fn is_static(&self) -> bool {
        self.attributes.contains(PropertyAttributes::STATIC)
    }
}

impl std::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("key", &self.key)
            .field("method", &self.method.is_some())
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("value", &self.value)
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// Whether key collection walks the prototype chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum KeyCollectionMode {
    IncludePrototypes = 0,
    OwnOnly,
}

/// Key filter bits, valued like `napi_key_filter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyFilter(u32);

impl KeyFilter {
    pub const ALL_PROPERTIES: Self = Self(0);
    pub const WRITABLE: Self = Self(1);
    pub const ENUMERABLE: Self = Self(1 << 1);
    pub const CONFIGURABLE: Self = Self(1 << 2);
    pub const SKIP_STRINGS: Self = Self(1 << 3);
    pub const SKIP_SYMBOLS: Self = Self(1 << 4);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for KeyFilter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// How integer-like keys are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum KeyConversion {
    KeepNumbers = 0,
    NumbersToStrings,
}

impl Env {
    /// Borrow an object handle, rejecting primitives
    pub(crate) fn object(&self, value: Value) -> NapiResult<JSValue> {
        let raw = self.raw(value)?;
        if !engine::is_object(raw) {
            return Err(Status::ObjectExpected);
        }
        Ok(raw)
    }

    /// # Safety
    /// `core` must belong to this env.
    unsafe fn key_atom(&self, core: Core, key: Value) -> NapiResult<Atom> {
        let raw = self.raw(key)?;
        // SAFETY: raw is live while its handle is
        unsafe { Atom::from_value(core.ctx, raw) }
    }

    /// # Safety
    /// `core` must belong to this env.
    pub(crate) unsafe fn property_atom(&self, core: Core, key: &PropertyKey) -> NapiResult<Atom> {
        // SAFETY: forwarded from the caller
        unsafe {
            match key {
                PropertyKey::Name(name) => Atom::new(core.ctx, name),
                PropertyKey::Value(value) => {
                    let raw = self.raw(*value)?;
                    if !engine::is_string(raw) && self.type_of(*value)? != crate::ValueType::Symbol {
                        return Err(Status::NameExpected);
                    }
                    Atom::from_value(core.ctx, raw)
                }
            }
        }
    }

    /// # Safety
    /// `object` must be live in `core.ctx`.
    unsafe fn set_atom(&self, core: Core, object: JSValue, atom: &Atom, value: Value) -> NapiResult<()> {
        let raw = self.raw(value)?;
        // SAFETY: JS_SetProperty consumes the duplicated value
        let rc = unsafe {
            qjs::JS_SetProperty(core.ctx, object, atom.raw(), qjs::JS_DupValue(core.ctx, raw))
        };
        if rc < 0 {
            return Err(Status::PendingException);
        }
        Ok(())
    }

    /// # Safety
    /// `object` must be live in `core.ctx`.
    unsafe fn get_atom(&self, core: Core, object: JSValue, atom: &Atom) -> NapiResult<Value> {
        // SAFETY: forwarded from the caller; getters may run script
        let value = unsafe { engine::checked(core.ctx, qjs::JS_GetProperty(core.ctx, object, atom.raw()))? };
        self.push(value)
    }

    /// # Safety
    /// `object` must be live in `core.ctx`.
    unsafe fn has_atom(&self, core: Core, object: JSValue, atom: &Atom) -> NapiResult<bool> {
        // SAFETY: forwarded from the caller; proxies may run script
        let rc = unsafe { qjs::JS_HasProperty(core.ctx, object, atom.raw()) };
        if rc < 0 {
            return Err(Status::PendingException);
        }
        Ok(rc > 0)
    }

    pub fn create_object(&self) -> NapiResult<Value> {
        let core = self.preamble()?;
        // SAFETY: ctx is live
        let object = unsafe { engine::checked(core.ctx, qjs::JS_NewObject(core.ctx))? };
        self.push(object)
    }

    pub fn create_array(&self) -> NapiResult<Value> {
        let core = self.preamble()?;
        // SAFETY: ctx is live
        let array = unsafe { engine::checked(core.ctx, qjs::JS_NewArray(core.ctx))? };
        self.push(array)
    }

    /// Array whose `length` is preset; the elements are holes
    pub fn create_array_with_length(&self, length: usize) -> NapiResult<Value> {
        let core = self.preamble()?;
        // SAFETY: ctx is live; the length value is consumed by the setter
        unsafe {
            let array = engine::checked(core.ctx, qjs::JS_NewArray(core.ctx))?;
            let length = engine::new_int64(length as i64);
            if qjs::JS_SetPropertyStr(core.ctx, array.raw(), c"length".as_ptr(), length) < 0 {
                return Err(Status::PendingException);
            }
            self.push(array)
        }
    }

    pub fn get_array_length(&self, array: Value) -> NapiResult<u32> {
        if !self.is_array(array)? {
            return Err(Status::ArrayExpected);
        }
        let core = self.core()?;
        let raw = self.raw(array)?;
        // SAFETY: raw is a live array
        unsafe {
            let length = engine::checked(
                core.ctx,
                qjs::JS_GetPropertyStr(core.ctx, raw, c"length".as_ptr()),
            )?;
            Ok(engine::to_f64(core.ctx, length.raw())? as u32)
        }
    }

    /// `object[key] = value`
    pub fn set_property(&self, object: Value, key: Value, value: Value) -> NapiResult<()> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: every value is live while its handle is
        unsafe {
            let atom = self.key_atom(core, key)?;
            self.set_atom(core, object, &atom, value)
        }
    }

    pub fn get_property(&self, object: Value, key: Value) -> NapiResult<Value> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: every value is live while its handle is
        unsafe {
            let atom = self.key_atom(core, key)?;
            self.get_atom(core, object, &atom)
        }
    }

    /// `key in object`
    pub fn has_property(&self, object: Value, key: Value) -> NapiResult<bool> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: every value is live while its handle is
        unsafe {
            let atom = self.key_atom(core, key)?;
            self.has_atom(core, object, &atom)
        }
    }

    /// `delete object[key]`; false when the property is not configurable
    pub fn delete_property(&self, object: Value, key: Value) -> NapiResult<bool> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: every value is live while its handle is
        unsafe {
            let atom = self.key_atom(core, key)?;
            let rc = qjs::JS_DeleteProperty(core.ctx, object, atom.raw(), 0);
            if rc < 0 {
                return Err(Status::PendingException);
            }
            Ok(rc > 0)
        }
    }

    /// Own-property test; the key must be a string or a symbol
    pub fn has_own_property(&self, object: Value, key: Value) -> NapiResult<bool> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: every value is live while its handle is
        unsafe {
            let atom = self.property_atom(core, &PropertyKey::Value(key))?;
            let rc = qjs::JS_GetOwnProperty(core.ctx, ptr::null_mut(), object, atom.raw());
            if rc < 0 {
                return Err(Status::PendingException);
            }
            Ok(rc > 0)
        }
    }

    pub fn set_named_property(&self, object: Value, name: &str, value: Value) -> NapiResult<()> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: every value is live while its handle is
        unsafe {
            let atom = Atom::new(core.ctx, name)?;
            self.set_atom(core, object, &atom, value)
        }
    }

    pub fn get_named_property(&self, object: Value, name: &str) -> NapiResult<Value> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: every value is live while its handle is
        unsafe {
            let atom = Atom::new(core.ctx, name)?;
            self.get_atom(core, object, &atom)
        }
    }

    pub fn has_named_property(&self, object: Value, name: &str) -> NapiResult<bool> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: every value is live while its handle is
        unsafe {
            let atom = Atom::new(core.ctx, name)?;
            self.has_atom(core, object, &atom)
        }
    }

    pub fn has_own_named_property(&self, object: Value, name: &str) -> NapiResult<bool> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: every value is live while its handle is
        unsafe {
            let atom = Atom::new(core.ctx, name)?;
            let rc = qjs::JS_GetOwnProperty(core.ctx, ptr::null_mut(), object, atom.raw());
            if rc < 0 {
                return Err(Status::PendingException);
            }
            Ok(rc > 0)
        }
    }

    pub fn set_element(&self, object: Value, index: u32, value: Value) -> NapiResult<()> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        let raw = self.raw(value)?;
        // SAFETY: the duplicated value is consumed by the setter
        let rc = unsafe {
            qjs::JS_SetPropertyUint32(core.ctx, object, index, qjs::JS_DupValue(core.ctx, raw))
        };
        if rc < 0 {
            return Err(Status::PendingException);
        }
        Ok(())
    }

    pub fn get_element(&self, object: Value, index: u32) -> NapiResult<Value> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: object is live while its handle is
        let element = unsafe { engine::array_get(core.ctx, object, index)? };
        self.push(element)
    }

    pub fn has_element(&self, object: Value, index: u32) -> NapiResult<bool> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: object is live while its handle is
        unsafe {
            let atom = Atom::from_value(core.ctx, engine::new_int64(i64::from(index)))?;
            self.has_atom(core, object, &atom)
        }
    }

    pub fn delete_element(&self, object: Value, index: u32) -> NapiResult<bool> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: object is live while its handle is
        unsafe {
            let atom = Atom::from_value(core.ctx, engine::new_int64(i64::from(index)))?;
            let rc = qjs::JS_DeleteProperty(core.ctx, object, atom.raw(), 0);
            if rc < 0 {
                return Err(Status::PendingException);
            }
            Ok(rc > 0)
        }
    }

    /// Enumerable string keys, inherited ones included, as `for...in` sees them
    pub fn get_property_names(&self, object: Value) -> NapiResult<Value> {
        self.get_all_property_names(
            object,
            KeyCollectionMode::IncludePrototypes,
            KeyFilter::ENUMERABLE | KeyFilter::SKIP_SYMBOLS,
            KeyConversion::NumbersToStrings,
        )
    }

    pub fn get_all_property_names(
        &self,
        object: Value,
        mode: KeyCollectionMode,
        filter: KeyFilter,
        conversion: KeyConversion,
    ) -> NapiResult<Value> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        let own_only = if mode == KeyCollectionMode::OwnOnly { qjs::JS_TRUE } else { qjs::JS_FALSE };
        let to_strings = if conversion == KeyConversion::NumbersToStrings {
            qjs::JS_TRUE
        } else {
            qjs::JS_FALSE
        };
        // SAFETY: every argument is live or a constant
        unsafe {
            let filter = engine::new_int64(i64::from(filter.bits()));
            self.call_helper(core, core.helpers.property_names, &[object, own_only, filter, to_strings])
        }
    }

    /// `Object.getPrototypeOf(object)`
    pub fn get_prototype(&self, object: Value) -> NapiResult<Value> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: object is live while its handle is
        unsafe { self.call_helper(core, core.helpers.get_prototype_of, &[object]) }
    }

    pub fn object_freeze(&self, object: Value) -> NapiResult<()> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: object is live while its handle is
        unsafe { engine::call(core.ctx, core.helpers.freeze, qjs::JS_UNDEFINED, &[object]).map(drop::<Owned>) }
    }

    pub fn object_seal(&self, object: Value) -> NapiResult<()> {
        let core = self.preamble()?;
        let object = self.object(object)?;
        // SAFETY: object is live while its handle is
        unsafe { engine::call(core.ctx, core.helpers.seal, qjs::JS_UNDEFINED, &[object]).map(drop::<Owned>) }
    }

    /// Define `property` on `target`, building functions for methods and accessors
    ///
    /// # Safety
    /// `core` must belong to this env and `target` must be a live object.
    pub(crate) unsafe fn define_on(
        &self,
        core: Core,
        target: JSValue,
        property: &PropertyDescriptor,
    ) -> NapiResult<()> {
        let attributes = property.attributes;
        // SAFETY: every function built here is consumed by the define call
        unsafe {
            let atom = self.property_atom(core, &property.key)?;
            let name = match &property.key {
                PropertyKey::Name(name) => name.clone(),
                PropertyKey::Value(_) => String::new(),
            };
            let rc = if let Some(method) = &property.method {
                let function = self.new_function_raw(core, &name, method.clone(), property.data)?;
                qjs::JS_DefinePropertyValue(
                    core.ctx,
                    target,
                    atom.raw(),
                    function.into_raw(),
                    attributes.data_flags(),
                )
            } else if property.getter.is_some() || property.setter.is_some() {
                let getter = match &property.getter {
                    Some(getter) => self.new_function_raw(core, &name, getter.clone(), property.data)?,
                    None => Owned::new(core.ctx, qjs::JS_UNDEFINED),
                };
                let setter = match &property.setter {
                    Some(setter) => self.new_function_raw(core, &name, setter.clone(), property.data)?,
                    None => Owned::new(core.ctx, qjs::JS_UNDEFINED),
                };
                qjs::JS_DefinePropertyGetSet(
                    core.ctx,
                    target,
                    atom.raw(),
                    getter.into_raw(),
                    setter.into_raw(),
                    attributes.accessor_flags(engine::PROP_THROW),
                )
            } else {
                let value = match property.value {
                    Some(value) => qjs::JS_DupValue(core.ctx, self.raw(value)?),
                    None => qjs::JS_UNDEFINED,
                };
                qjs::JS_DefinePropertyValue(core.ctx, target, atom.raw(), value, attributes.data_flags())
            };
            if rc < 0 {
                return Err(Status::PendingException);
            }
            Ok(())
        }
    }

    /// Define each descriptor on `object`, stopping at the first failure
    pub fn define_properties(&self, object: Value, properties: &[PropertyDescriptor]) -> NapiResult<()> {
        let core = self.preamble()?;
        let target = self.object(object)?;
        for property in properties {
            // SAFETY: target is live while its handle is
            unsafe { self.define_on(core, target, property)? };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;

    #[test]
    fn test_named_and_keyed_access() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let object = env.create_object().unwrap();
            let one = env.create_int32(1).unwrap();
            env.set_named_property(object, "a", one).unwrap();
            assert!(env.has_named_property(object, "a").unwrap());
            assert!(!env.has_named_property(object, "b").unwrap());

            let key = env.create_string_utf8("a").unwrap();
            let got = env.get_property(object, key).unwrap();
            assert_eq!(env.get_value_int32(got).unwrap(), 1);
            assert!(env.has_own_property(object, key).unwrap());

            let symbol = env.create_symbol(None).unwrap();
            env.set_property(object, symbol, one).unwrap();
            assert!(env.has_property(object, symbol).unwrap());

            assert!(env.delete_property(object, key).unwrap());
            assert!(!env.has_property(object, key).unwrap());
            let missing = env.get_named_property(object, "a").unwrap();
            assert_eq!(env.type_of(missing).unwrap(), crate::ValueType::Undefined);
        });
    }

    #[test]
    fn test_inherited_is_not_own() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let object = env.create_object().unwrap();
            let key = env.create_string_utf8("toString").unwrap();
            assert!(env.has_property(object, key).unwrap());
            assert!(!env.has_own_property(object, key).unwrap());

            let number = env.create_int32(3).unwrap();
            assert_eq!(env.has_own_property(object, number), Err(Status::NameExpected));
        });
    }

    #[test]
    fn test_primitives_are_rejected() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let number = env.create_int32(3).unwrap();
            assert_eq!(env.get_named_property(number, "x"), Err(Status::ObjectExpected));
            assert_eq!(env.get_element(number, 0), Err(Status::ObjectExpected));
            assert_eq!(env.get_array_length(number), Err(Status::ArrayExpected));
        });
    }

    #[test]
    fn test_elements() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let array = env.create_array_with_length(3).unwrap();
            assert_eq!(env.get_array_length(array).unwrap(), 3);
            assert!(!env.has_element(array, 1).unwrap());

            let value = env.create_string_utf8("x").unwrap();
            env.set_element(array, 1, value).unwrap();
            assert!(env.has_element(array, 1).unwrap());
            let got = env.get_element(array, 1).unwrap();
            assert_eq!(env.get_value_string_utf8(got).unwrap(), "x");

            env.set_element(array, 5, value).unwrap();
            assert_eq!(env.get_array_length(array).unwrap(), 6);
            assert!(env.delete_element(array, 5).unwrap());
            assert!(!env.has_element(array, 5).unwrap());
        });
    }

    #[test]
    fn test_property_names() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let object = env
                .run_script_str(
                    "const base = { inherited: 1 };\
                     const o = Object.create(base);\
                     o.own = 2; o[7] = 3; o[Symbol('s')] = 4;\
                     Object.defineProperty(o, 'hidden', { value: 5, enumerable: false });\
                     o",
                    "<test>",
                )
                .unwrap();

            let names = env.get_property_names(object).unwrap();
            let names = env.to_json(names).unwrap();
            assert_eq!(names, serde_json::json!(["7", "own", "inherited"]));

            let own = env
                .get_all_property_names(
                    object,
                    KeyCollectionMode::OwnOnly,
                    KeyFilter::SKIP_SYMBOLS,
                    KeyConversion::KeepNumbers,
                )
                .unwrap();
            assert_eq!(
                env.to_json(own).unwrap(),
                serde_json::json!([7, "own", "hidden"])
            );

            let symbols = env
                .get_all_property_names(
                    object,
                    KeyCollectionMode::OwnOnly,
                    KeyFilter::SKIP_STRINGS,
                    KeyConversion::KeepNumbers,
                )
                .unwrap();
            assert_eq!(env.get_array_length(symbols).unwrap(), 1);
        });
    }

    #[test]
    fn test_prototype_freeze_seal() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let array = env.create_array().unwrap();
            let proto = env.get_prototype(array).unwrap();
            let expected = env.run_script_str("Array.prototype", "<test>").unwrap();
            assert!(env.strict_equals(proto, expected).unwrap());

            let frozen = env.create_object().unwrap();
            let one = env.create_int32(1).unwrap();
            env.set_named_property(frozen, "x", one).unwrap();
            env.object_freeze(frozen).unwrap();
            let two = env.create_int32(2).unwrap();
            assert_eq!(
                env.set_named_property(frozen, "x", two),
                Err(Status::PendingException)
            );
            env.get_and_clear_last_exception().unwrap();
            let x = env.get_named_property(frozen, "x").unwrap();
            assert_eq!(env.get_value_int32(x).unwrap(), 1);

            let sealed = env.create_object().unwrap();
            env.set_named_property(sealed, "y", one).unwrap();
            env.object_seal(sealed).unwrap();
            let key = env.create_string_utf8("y").unwrap();
            assert!(!env.delete_property(sealed, key).unwrap());
        });
    }

    #[test]
    fn test_define_value_properties() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let object = env.create_object().unwrap();
            let one = env.create_int32(1).unwrap();
            env.define_properties(
                object,
                &[
                    PropertyDescriptor::value("open", one),
                    PropertyDescriptor::value("fixed", one)
                        .with_attributes(PropertyAttributes::ENUMERABLE),
                ],
            )
            .unwrap();

            let global = env.get_global().unwrap();
            env.set_named_property(global, "target", object).unwrap();
            let result = env
                .run_script_str(
                    "'use strict'; let threw = false;\
                     try { target.fixed = 2; } catch (e) { threw = e instanceof TypeError; }\
                     target.open = 3; threw && target.open === 3 && target.fixed === 1",
                    "<test>",
                )
                .unwrap();
            assert!(env.get_value_bool(result).unwrap());
        });
    }

    #[test]
    fn test_attribute_bits() {
        let attributes = PropertyAttributes::WRITABLE | PropertyAttributes::STATIC;
        assert_eq!(attributes.bits(), 1025);
        assert!(attributes.contains(PropertyAttributes::STATIC));
        assert!(!attributes.contains(PropertyAttributes::ENUMERABLE));
        assert_eq!(PropertyAttributes::DEFAULT_JSPROPERTY.bits(), 7);
    }
}
