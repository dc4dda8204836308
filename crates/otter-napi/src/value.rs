//! Primitive values, strings, symbols, dates, coercion and JSON

use std::ffi::CString;

use crate::engine::{self, JSValue, Owned, qjs};
use crate::env::{Core, Env};
use crate::error::{NapiResult, Status};
use crate::scope::Value;

/// Result of [`Env::type_of`], numbered like `napi_valuetype`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ValueType {
    Undefined = 0,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Object,
    Function,
    External,
    Bigint,
}

impl Env {
    /// Call a boolean-returning helper
    ///
    /// # Safety
    /// `core` must belong to this env and `args` must be live.
    pub(crate) unsafe fn predicate(&self, core: Core, func: JSValue, args: &[JSValue]) -> NapiResult<bool> {
        // SAFETY: forwarded from the caller
        unsafe {
            let result = engine::call(core.ctx, func, qjs::JS_UNDEFINED, args)?;
            Ok(engine::truthy(qjs::JS_ToBool(core.ctx, result.raw())))
        }
    }

    /// Call a helper and attach its result to the current scope
    ///
    /// # Safety
    /// `core` must belong to this env and `args` must be live.
    pub(crate) unsafe fn call_helper(&self, core: Core, func: JSValue, args: &[JSValue]) -> NapiResult<Value> {
        // SAFETY: forwarded from the caller
        let result = unsafe { engine::call(core.ctx, func, qjs::JS_UNDEFINED, args)? };
        self.push(result)
    }

    /// `typeof`, with externals reported separately from plain objects
    pub fn type_of(&self, value: Value) -> NapiResult<ValueType> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        if engine::is_undefined(raw) {
            return Ok(ValueType::Undefined);
        }
        if engine::is_null(raw) {
            return Ok(ValueType::Null);
        }
        if engine::is_bool(raw) {
            return Ok(ValueType::Boolean);
        }
        if engine::is_number(raw) {
            return Ok(ValueType::Number);
        }
        if engine::is_string(raw) {
            return Ok(ValueType::String);
        }
        if engine::is_object(raw) {
            // SAFETY: raw is live while its handle is
            unsafe {
                if self.external_payload(raw).is_some() {
                    return Ok(ValueType::External);
                }
                if engine::is_function(core.ctx, raw) {
                    return Ok(ValueType::Function);
                }
            }
            return Ok(ValueType::Object);
        }

        // SAFETY: raw is live while its handle is
        let name = unsafe {
            let name = engine::call(core.ctx, core.helpers.type_of, qjs::JS_UNDEFINED, &[raw])?;
            engine::to_rust_string(core.ctx, name.raw())?
        };
        Ok(match name.as_str() {
            "symbol" => ValueType::Symbol,
            "bigint" => ValueType::Bigint,
            "string" => ValueType::String,
            "number" => ValueType::Number,
            "function" => ValueType::Function,
            _ => ValueType::Object,
        })
    }

    pub fn get_undefined(&self) -> NapiResult<Value> {
        self.core()?;
        self.push_plain(qjs::JS_UNDEFINED)
    }

    pub fn get_null(&self) -> NapiResult<Value> {
        self.core()?;
        self.push_plain(qjs::JS_NULL)
    }

    pub fn get_global(&self) -> NapiResult<Value> {
        let core = self.core()?;
        // SAFETY: the global object outlives the env's core
        self.push(unsafe { Owned::dup(core.ctx, core.global) })
    }

    pub fn get_boolean(&self, value: bool) -> NapiResult<Value> {
        self.core()?;
        self.push_plain(if value { qjs::JS_TRUE } else { qjs::JS_FALSE })
    }

    pub fn create_int32(&self, value: i32) -> NapiResult<Value> {
        self.core()?;
        self.push_plain(engine::new_int32(value))
    }

    pub fn create_uint32(&self, value: u32) -> NapiResult<Value> {
        self.create_int64(i64::from(value))
    }

    /// Integers beyond 2^53 lose precision, as they do in script
    pub fn create_int64(&self, value: i64) -> NapiResult<Value> {
        self.core()?;
        self.push_plain(engine::new_int64(value))
    }

    pub fn create_double(&self, value: f64) -> NapiResult<Value> {
        self.core()?;
        self.push_plain(engine::new_float64(value))
    }

    pub fn create_string_utf8(&self, value: &str) -> NapiResult<Value> {
        let core = self.core()?;
        // SAFETY: ctx is live
        let string = unsafe { engine::new_string(core.ctx, value)? };
        self.push(string)
    }

    /// Each byte is one code point in `U+0000..=U+00FF`
    pub fn create_string_latin1(&self, value: &[u8]) -> NapiResult<Value> {
        let decoded: String = value.iter().map(|&byte| char::from(byte)).collect();
        self.create_string_utf8(&decoded)
    }

    /// Unpaired surrogates are replaced with U+FFFD
    pub fn create_string_utf16(&self, value: &[u16]) -> NapiResult<Value> {
        self.create_string_utf8(&String::from_utf16_lossy(value))
    }

    fn number(&self, value: Value) -> NapiResult<(Core, JSValue)> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        if !engine::is_number(raw) {
            return Err(Status::NumberExpected);
        }
        Ok((core, raw))
    }

    pub fn get_value_double(&self, value: Value) -> NapiResult<f64> {
        let (core, raw) = self.number(value)?;
        // SAFETY: raw is a number, so the conversion cannot run script
        unsafe { engine::to_f64(core.ctx, raw) }
    }

    /// ToInt32 semantics: non-finite values become 0, others wrap modulo 2^32
    pub fn get_value_int32(&self, value: Value) -> NapiResult<i32> {
        let (core, raw) = self.number(value)?;
        let mut out = 0i32;
        // SAFETY: raw is a number, so the conversion cannot run script
        if unsafe { qjs::JS_ToInt32(core.ctx, &mut out, raw) } < 0 {
            return Err(Status::PendingException);
        }
        Ok(out)
    }

    pub fn get_value_uint32(&self, value: Value) -> NapiResult<u32> {
        self.get_value_int32(value).map(|v| v as u32)
    }

    /// Non-finite values become 0; out-of-range values saturate
    pub fn get_value_int64(&self, value: Value) -> NapiResult<i64> {
        let number = self.get_value_double(value)?;
        Ok(if number.is_finite() { number as i64 } else { 0 })
    }

    pub fn get_value_bool(&self, value: Value) -> NapiResult<bool> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        if !engine::is_bool(raw) {
            return Err(Status::BooleanExpected);
        }
        // SAFETY: raw is a boolean
        Ok(engine::truthy(unsafe { qjs::JS_ToBool(core.ctx, raw) }))
    }

    fn string(&self, value: Value) -> NapiResult<String> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        if !engine::is_string(raw) {
            return Err(Status::StringExpected);
        }
        // SAFETY: raw is a string, so the conversion cannot run script
        unsafe { engine::to_rust_string(core.ctx, raw) }
    }

    pub fn get_value_string_utf8(&self, value: Value) -> NapiResult<String> {
        self.string(value)
    }

    /// Code points above U+00FF are truncated to their low byte
    pub fn get_value_string_latin1(&self, value: Value) -> NapiResult<Vec<u8>> {
        Ok(self.string(value)?.chars().map(|c| c as u32 as u8).collect())
    }

    pub fn get_value_string_utf16(&self, value: Value) -> NapiResult<Vec<u16>> {
        Ok(self.string(value)?.encode_utf16().collect())
    }

    /// Create a unique symbol; the description must be a string when given
    pub fn create_symbol(&self, description: Option<Value>) -> NapiResult<Value> {
        let core = self.core()?;
        let description = match description {
            Some(description) => {
                let raw = self.raw(description)?;
                if !engine::is_string(raw) {
                    return Err(Status::StringExpected);
                }
                raw
            }
            None => qjs::JS_UNDEFINED,
        };
        // SAFETY: the description is live while its handle is
        unsafe { self.call_helper(core, core.helpers.make_symbol, &[description]) }
    }

    /// `Symbol.for(key)`
    pub fn symbol_for(&self, key: &str) -> NapiResult<Value> {
        let core = self.core()?;
        // SAFETY: the key string is owned for the call
        unsafe {
            let key = engine::new_string(core.ctx, key)?;
            self.call_helper(core, core.helpers.symbol_for, &[key.raw()])
        }
    }

    pub fn create_date(&self, time: f64) -> NapiResult<Value> {
        let core = self.preamble()?;
        // SAFETY: numbers carry no reference count
        unsafe { self.call_helper(core, core.helpers.make_date, &[engine::new_float64(time)]) }
    }

    pub fn is_date(&self, value: Value) -> NapiResult<bool> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        if !engine::is_object(raw) {
            return Ok(false);
        }
        // SAFETY: raw is live while its handle is
        unsafe { self.predicate(core, core.helpers.is_date, &[raw]) }
    }

    /// Milliseconds since the epoch
    pub fn get_date_value(&self, value: Value) -> NapiResult<f64> {
        if !self.is_date(value)? {
            return Err(Status::DateExpected);
        }
        let core = self.core()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is a live Date
        unsafe {
            let time = engine::call(core.ctx, core.helpers.date_value, qjs::JS_UNDEFINED, &[raw])?;
            engine::to_f64(core.ctx, time.raw())
        }
    }

    pub fn coerce_to_bool(&self, value: Value) -> NapiResult<Value> {
        let core = self.preamble()?;
        let raw = self.raw(value)?;
        // SAFETY: ToBoolean runs no script
        let truthy = engine::truthy(unsafe { qjs::JS_ToBool(core.ctx, raw) });
        self.get_boolean(truthy)
    }

    pub fn coerce_to_number(&self, value: Value) -> NapiResult<Value> {
        let core = self.preamble()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is live; valueOf may run script and throw
        let number = unsafe { engine::to_f64(core.ctx, raw)? };
        self.create_double(number)
    }

    pub fn coerce_to_string(&self, value: Value) -> NapiResult<Value> {
        let core = self.preamble()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is live; toString may run script and throw
        let string = unsafe { engine::checked(core.ctx, qjs::JS_ToString(core.ctx, raw))? };
        self.push(string)
    }

    /// ToObject; `null` and `undefined` throw a TypeError
    pub fn coerce_to_object(&self, value: Value) -> NapiResult<Value> {
        let core = self.preamble()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is live while its handle is
        unsafe { self.call_helper(core, core.helpers.to_object, &[raw]) }
    }

    /// `a === b`
    pub fn strict_equals(&self, a: Value, b: Value) -> NapiResult<bool> {
        let core = self.core()?;
        let (a, b) = (self.raw(a)?, self.raw(b)?);
        // SAFETY: both values are live while their handles are
        unsafe { self.predicate(core, core.helpers.strict_equals, &[a, b]) }
    }

    /// `object instanceof constructor`
    pub fn instanceof(&self, object: Value, constructor: Value) -> NapiResult<bool> {
        let core = self.preamble()?;
        let object = self.raw(object)?;
        let constructor = self.raw(constructor)?;
        // SAFETY: both values are live while their handles are
        unsafe {
            if !engine::is_function(core.ctx, constructor) {
                return Err(Status::FunctionExpected);
            }
            let result = qjs::JS_IsInstanceOf(core.ctx, object, constructor);
            if result < 0 {
                return Err(Status::PendingException);
            }
            Ok(result > 0)
        }
    }

    pub fn is_array(&self, value: Value) -> NapiResult<bool> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        if !engine::is_object(raw) {
            return Ok(false);
        }
        // SAFETY: raw is live while its handle is
        unsafe { self.predicate(core, core.helpers.is_array, &[raw]) }
    }

    /// `JSON.parse(text)`
    pub fn json_parse(&self, text: &str) -> NapiResult<Value> {
        let core = self.preamble()?;
        let source = CString::new(text).map_err(|_| Status::InvalidArg)?;
        // SAFETY: the source is NUL-terminated as the parser requires
        let parsed = unsafe {
            engine::checked(
                core.ctx,
                qjs::JS_ParseJSON(core.ctx, source.as_ptr(), text.len() as _, c"<json>".as_ptr()),
            )?
        };
        self.push(parsed)
    }

    /// `JSON.stringify(value)`; `None` for values JSON cannot represent
    pub fn json_stringify(&self, value: Value) -> NapiResult<Option<String>> {
        let core = self.preamble()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is live; toJSON may run script and throw
        unsafe {
            let text = engine::checked(
                core.ctx,
                qjs::JS_JSONStringify(core.ctx, raw, qjs::JS_UNDEFINED, qjs::JS_UNDEFINED),
            )?;
            if engine::is_undefined(text.raw()) {
                return Ok(None);
            }
            engine::to_rust_string(core.ctx, text.raw()).map(Some)
        }
    }

    /// Convert through JSON into a `serde_json::Value`
    pub fn to_json(&self, value: Value) -> NapiResult<serde_json::Value> {
        match self.json_stringify(value)? {
            Some(text) => serde_json::from_str(&text).map_err(|_| Status::GenericFailure),
            None => Ok(serde_json::Value::Null),
        }
    }

    /// Build a script value from a `serde_json::Value`
    pub fn from_json(&self, json: &serde_json::Value) -> NapiResult<Value> {
        let text = serde_json::to_string(json).map_err(|_| Status::InvalidArg)?;
        self.json_parse(&text)
    }
}
