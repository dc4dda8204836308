//! Node-API C ABI over the safe [`Env`] surface
//!
//! Each `napi_*` symbol validates its pointers, forwards to the matching `Env`
//! method and stores the outcome as the environment's last error record, so
//! `napi_get_last_error_info` always describes the previous call.
//!
//! Handles cross the boundary as the opaque bits of [`Value`], [`Reference`],
//! [`Deferred`] and the scope tokens; none of them is a real pointer.

#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr;
use std::rc::Rc;
use std::slice;

use crate::buffer::TypedArrayType;
use crate::env::{Env, Environment};
use crate::error::{ExtendedErrorInfo, NapiResult, Status};
use crate::external::{Finalize, TypeTag};
use crate::function::{Callback, CallbackInfo, callback};
use crate::promise::Deferred;
use crate::property::{
    KeyCollectionMode, KeyConversion, KeyFilter, PropertyAttributes, PropertyDescriptor, PropertyKey,
};
use crate::reference::Reference;
use crate::runtime::Runtime;
use crate::scope::{EscapableHandleScope, HandleScope, Value};
use crate::value::ValueType;

pub type napi_status = Status;
pub type napi_env = *mut Env;
pub type napi_value = *mut c_void;
pub type napi_ref = *mut c_void;
pub type napi_deferred = *mut c_void;
pub type napi_handle_scope = *mut c_void;
pub type napi_escapable_handle_scope = *mut c_void;
pub type napi_callback_info = *const CallbackInfo;
pub type napi_valuetype = ValueType;
pub type napi_typedarray_type = c_int;
pub type napi_type_tag = TypeTag;
pub type napi_extended_error_info = ExtendedErrorInfo;

pub type napi_callback = Option<unsafe extern "C" fn(napi_env, napi_callback_info) -> napi_value>;
pub type napi_finalize = Option<unsafe extern "C" fn(napi_env, *mut c_void, *mut c_void)>;

/// Length sentinel for NUL-terminated input strings
pub const NAPI_AUTO_LENGTH: usize = usize::MAX;

/// `napi_property_descriptor`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct napi_property_descriptor {
    pub utf8name: *const c_char,
    pub name: napi_value,
    pub method: napi_callback,
    pub getter: napi_callback,
    pub setter: napi_callback,
    pub value: napi_value,
    pub attributes: u32,
    pub data: *mut c_void,
}

// ============================================================================
// Plumbing
// ============================================================================

/// Run `f` against the env behind `env` and record its status
///
/// # Safety
/// `env` must be null or a pointer handed out by `otter_napi_create_env` or a callback.
unsafe fn with_env(env: napi_env, f: impl FnOnce(&Env) -> NapiResult<()>) -> napi_status {
    // SAFETY: forwarded from the caller
    let Some(env) = (unsafe { env.as_ref() }) else {
        return Status::InvalidArg;
    };
    Status::of(&env.record(f(env)))
}

fn env_ptr(env: &Env) -> napi_env {
    ptr::from_ref(env).cast_mut()
}

fn handle(raw: napi_value) -> NapiResult<Value> {
    Value::from_bits(raw as usize as u64).ok_or(Status::InvalidArg)
}

fn optional(raw: napi_value) -> Option<Value> {
    Value::from_bits(raw as usize as u64)
}

fn to_napi(value: Value) -> napi_value {
    value.to_bits() as usize as napi_value
}

fn reference(raw: napi_ref) -> NapiResult<Reference> {
    Reference::from_bits(raw as usize).ok_or(Status::InvalidArg)
}

/// # Safety
/// `out` must be null or valid for a write of `T`.
unsafe fn set<T>(out: *mut T, value: T) -> NapiResult<()> {
    if out.is_null() {
        return Err(Status::InvalidArg);
    }
    // SAFETY: checked non-null; validity is on the caller
    unsafe { out.write(value) };
    Ok(())
}

/// Write `value` when the caller asked for it
///
/// # Safety
/// `out` must be null or valid for a write of `T`.
unsafe fn set_opt<T>(out: *mut T, value: T) {
    if !out.is_null() {
        // SAFETY: checked non-null; validity is on the caller
        unsafe { out.write(value) };
    }
}

/// # Safety
/// `text` must be null or point at `length` bytes, or a NUL-terminated string for
/// [`NAPI_AUTO_LENGTH`].
unsafe fn utf8<'a>(text: *const c_char, length: usize) -> NapiResult<Cow<'a, str>> {
    if text.is_null() {
        return if length == 0 { Ok(Cow::Borrowed("")) } else { Err(Status::InvalidArg) };
    }
    // SAFETY: forwarded from the caller
    let bytes = unsafe {
        if length == NAPI_AUTO_LENGTH {
            CStr::from_ptr(text).to_bytes()
        } else {
            slice::from_raw_parts(text.cast::<u8>(), length)
        }
    };
    Ok(String::from_utf8_lossy(bytes))
}

/// # Safety
/// Same contract as [`utf8`], with `T`-sized units terminated by a zero unit.
unsafe fn units<'a, T: Copy + Default + PartialEq>(text: *const T, length: usize) -> NapiResult<&'a [T]> {
    if text.is_null() {
        return if length == 0 { Ok(&[]) } else { Err(Status::InvalidArg) };
    }
    let length = if length == NAPI_AUTO_LENGTH {
        let mut n = 0;
        // SAFETY: the caller promises a terminating zero unit
        while unsafe { *text.add(n) } != T::default() {
            n += 1;
        }
        n
    } else {
        length
    };
    // SAFETY: forwarded from the caller
    Ok(unsafe { slice::from_raw_parts(text, length) })
}

/// Copy `source` into a caller buffer, NUL-terminated and truncated to fit
///
/// A null `buf` asks for the full length instead.
///
/// # Safety
/// `buf` must be null or valid for `bufsize` units; `result` null or writable.
unsafe fn copy_out<T: Copy + Default>(
    source: &[T],
    buf: *mut T,
    bufsize: usize,
    result: *mut usize,
    fit: impl Fn(usize) -> usize,
) -> NapiResult<()> {
    if buf.is_null() {
        // SAFETY: forwarded from the caller
        return unsafe { set(result, source.len()) };
    }
    if bufsize == 0 {
        // SAFETY: forwarded from the caller
        unsafe { set_opt(result, 0) };
        return Ok(());
    }
    let copied = fit(source.len().min(bufsize - 1));
    // SAFETY: `copied` < bufsize, so the terminator fits too
    unsafe {
        ptr::copy_nonoverlapping(source.as_ptr(), buf, copied);
        buf.add(copied).write(T::default());
        set_opt(result, copied);
    }
    Ok(())
}

/// # Safety
/// `argv` must hold `argc` handles when `argc` is non-zero.
unsafe fn handles(argc: usize, argv: *const napi_value) -> NapiResult<Vec<Value>> {
    if argc == 0 {
        return Ok(Vec::new());
    }
    if argv.is_null() {
        return Err(Status::InvalidArg);
    }
    // SAFETY: forwarded from the caller
    unsafe { slice::from_raw_parts(argv, argc) }
        .iter()
        .map(|raw| handle(*raw))
        .collect()
}

fn native_callback(
    cb: unsafe extern "C" fn(napi_env, napi_callback_info) -> napi_value,
) -> impl Fn(&Env, &CallbackInfo) -> NapiResult<Option<Value>> + 'static {
    move |env: &Env, info: &CallbackInfo| {
        // SAFETY: the callee receives the live env and the info of this call only
        let result = unsafe { cb(env_ptr(env), ptr::from_ref(info)) };
        Ok(optional(result))
    }
}

fn shared_callback(cb: napi_callback) -> Option<Rc<Callback>> {
    cb.map(|cb| callback(native_callback(cb)))
}

fn native_finalize(finalize: napi_finalize) -> Option<Finalize> {
    finalize.map(|f| -> Finalize {
        Box::new(move |env: &Env, data: *mut c_void, hint: *mut c_void| {
            // SAFETY: the finalizer runs on the owning thread with a live env
            unsafe { f(env_ptr(env), data, hint) }
        })
    })
}

/// # Safety
/// `descriptor` strings and handles must be valid for the call.
unsafe fn descriptor(descriptor: &napi_property_descriptor) -> NapiResult<PropertyDescriptor> {
    let key = if descriptor.utf8name.is_null() {
        PropertyKey::Value(handle(descriptor.name)?)
    } else {
        // SAFETY: forwarded from the caller
        PropertyKey::Name(unsafe { utf8(descriptor.utf8name, NAPI_AUTO_LENGTH)? }.into_owned())
    };
    Ok(PropertyDescriptor {
        key,
        method: shared_callback(descriptor.method),
        getter: shared_callback(descriptor.getter),
        setter: shared_callback(descriptor.setter),
        value: optional(descriptor.value),
        attributes: PropertyAttributes::from_bits(descriptor.attributes),
        data: descriptor.data,
    })
}

/// # Safety
/// `properties` must hold `count` descriptors when `count` is non-zero.
unsafe fn descriptors(count: usize, properties: *const napi_property_descriptor) -> NapiResult<Vec<PropertyDescriptor>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if properties.is_null() {
        return Err(Status::InvalidArg);
    }
    // SAFETY: forwarded from the caller
    unsafe { slice::from_raw_parts(properties, count) }
        .iter()
        .map(|property| unsafe { descriptor(property) })
        .collect()
}

// ============================================================================
// Environment lifecycle
// ============================================================================

/// Create a runtime with default settings and one environment on it
///
/// The runtime lives as long as the environment.
///
/// # Safety
/// `result` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn otter_napi_create_env(result: *mut napi_env) -> napi_status {
    let env = Runtime::new().and_then(|runtime| runtime.create_env());
    match env {
        // SAFETY: forwarded from the caller
        Ok(env) => match unsafe { set(result, env.into_raw()) } {
            Ok(()) => Status::Ok,
            Err(status) => status,
        },
        Err(status) => status,
    }
}

/// Tear down an environment created by [`otter_napi_create_env`]
///
/// # Safety
/// `env` must come from `otter_napi_create_env` and is invalid afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn otter_napi_free_env(env: napi_env) -> napi_status {
    if env.is_null() {
        return Status::InvalidArg;
    }
    // SAFETY: forwarded from the caller
    drop(unsafe { Environment::from_raw(env) });
    Status::Ok
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn otter_napi_run_gc(env: napi_env) -> napi_status {
    unsafe { with_env(env, |env| env.run_gc()) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn otter_napi_run_microtasks(env: napi_env) -> napi_status {
    unsafe { with_env(env, |env| env.run_microtasks()) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_run_microtasks(env: napi_env) -> napi_status {
    unsafe { with_env(env, |env| env.run_microtasks()) }
}

/// Accepted for ABI parity; no call here hands out engine-owned C strings
///
/// Strings are always copied into caller buffers, so there is nothing to release.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_free_cstring(env: napi_env, _value: *const c_char) -> napi_status {
    unsafe { with_env(env, |_| Ok(())) }
}

/// Pointer to the last error record; not itself recorded
#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_last_error_info(
    env: napi_env,
    result: *mut *const napi_extended_error_info,
) -> napi_status {
    // SAFETY: forwarded from the caller
    let Some(env) = (unsafe { env.as_ref() }) else {
        return Status::InvalidArg;
    };
    // SAFETY: forwarded from the caller
    match unsafe { set(result, env.last_error_ptr()) } {
        Ok(()) => Status::Ok,
        Err(status) => status,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_version(env: napi_env, result: *mut u32) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.get_version())) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_set_instance_data(
    env: napi_env,
    data: *mut c_void,
    finalize_cb: napi_finalize,
    finalize_hint: *mut c_void,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            env.set_instance_data(data, native_finalize(finalize_cb), finalize_hint)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_instance_data(env: napi_env, data: *mut *mut c_void) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let value = env.get_instance_data()?.unwrap_or(ptr::null_mut());
            set(data, value)
        })
    }
}

// ============================================================================
// Handle scopes
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_open_handle_scope(env: napi_env, result: *mut napi_handle_scope) -> napi_status {
    unsafe {
        with_env(env, |env| {
            env.core()?;
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let scope = env.open_handle_scope();
            set(result, (scope.to_bits() as usize + 1) as napi_handle_scope)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_close_handle_scope(env: napi_env, scope: napi_handle_scope) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let id = (scope as usize).checked_sub(1).ok_or(Status::InvalidArg)?;
            env.close_handle_scope(HandleScope::from_bits(id as u32))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_open_escapable_handle_scope(
    env: napi_env,
    result: *mut napi_escapable_handle_scope,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            env.core()?;
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let scope = env.open_escapable_handle_scope();
            set(result, (scope.to_bits() as usize + 1) as napi_escapable_handle_scope)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_close_escapable_handle_scope(
    env: napi_env,
    scope: napi_escapable_handle_scope,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let id = (scope as usize).checked_sub(1).ok_or(Status::InvalidArg)?;
            env.close_escapable_handle_scope(EscapableHandleScope::from_bits(id as u32))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_escape_handle(
    env: napi_env,
    scope: napi_escapable_handle_scope,
    escapee: napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let id = (scope as usize).checked_sub(1).ok_or(Status::InvalidArg)?;
            let scope = EscapableHandleScope::from_bits(id as u32);
            let escaped = env.escape_handle(&scope, handle(escapee)?)?;
            set(result, to_napi(escaped))
        })
    }
}

// ============================================================================
// Singletons and primitives
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_undefined(env: napi_env, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.get_undefined()?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_null(env: napi_env, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.get_null()?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_global(env: napi_env, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.get_global()?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_boolean(env: napi_env, value: bool, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.get_boolean(value)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_int32(env: napi_env, value: i32, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_int32(value)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_uint32(env: napi_env, value: u32, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_uint32(value)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_int64(env: napi_env, value: i64, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_int64(value)?))) }
}

/// Numbers above 2^53 round to the nearest double
#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_uint64(env: napi_env, value: u64, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_double(value as f64)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_double(env: napi_env, value: f64, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_double(value)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_string_utf8(
    env: napi_env,
    text: *const c_char,
    length: usize,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let text = utf8(text, length)?;
            set(result, to_napi(env.create_string_utf8(&text)?))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_string_latin1(
    env: napi_env,
    text: *const c_char,
    length: usize,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let text = units(text.cast::<u8>(), length)?;
            set(result, to_napi(env.create_string_latin1(text)?))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_string_utf16(
    env: napi_env,
    text: *const u16,
    length: usize,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let text = units(text, length)?;
            set(result, to_napi(env.create_string_utf16(text)?))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_typeof(env: napi_env, value: napi_value, result: *mut napi_valuetype) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.type_of(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_double(env: napi_env, value: napi_value, result: *mut f64) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.get_value_double(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_int32(env: napi_env, value: napi_value, result: *mut i32) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.get_value_int32(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_uint32(env: napi_env, value: napi_value, result: *mut u32) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.get_value_uint32(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_int64(env: napi_env, value: napi_value, result: *mut i64) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.get_value_int64(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_bool(env: napi_env, value: napi_value, result: *mut bool) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.get_value_bool(handle(value)?)?)) }
}

/// UTF-8 contents; truncation never splits a character
#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_string_utf8(
    env: napi_env,
    value: napi_value,
    buf: *mut c_char,
    bufsize: usize,
    result: *mut usize,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let text = env.get_value_string_utf8(handle(value)?)?;
            let fit = |mut n: usize| {
                while !text.is_char_boundary(n) {
                    n -= 1;
                }
                n
            };
            copy_out(text.as_bytes(), buf.cast::<u8>(), bufsize, result, fit)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_string_latin1(
    env: napi_env,
    value: napi_value,
    buf: *mut c_char,
    bufsize: usize,
    result: *mut usize,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let text = env.get_value_string_latin1(handle(value)?)?;
            copy_out(&text, buf.cast::<u8>(), bufsize, result, |n| n)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_string_utf16(
    env: napi_env,
    value: napi_value,
    buf: *mut u16,
    bufsize: usize,
    result: *mut usize,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let text = env.get_value_string_utf16(handle(value)?)?;
            copy_out(&text, buf, bufsize, result, |n| n)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_symbol(
    env: napi_env,
    description: napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_symbol(optional(description))?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn node_api_symbol_for(
    env: napi_env,
    text: *const c_char,
    length: usize,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let key = utf8(text, length)?;
            set(result, to_napi(env.symbol_for(&key)?))
        })
    }
}

// ============================================================================
// Coercion and comparison
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_coerce_to_bool(env: napi_env, value: napi_value, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.coerce_to_bool(handle(value)?)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_coerce_to_number(
    env: napi_env,
    value: napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.coerce_to_number(handle(value)?)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_coerce_to_string(
    env: napi_env,
    value: napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.coerce_to_string(handle(value)?)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_coerce_to_object(
    env: napi_env,
    value: napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.coerce_to_object(handle(value)?)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_strict_equals(
    env: napi_env,
    lhs: napi_value,
    rhs: napi_value,
    result: *mut bool,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.strict_equals(handle(lhs)?, handle(rhs)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_instanceof(
    env: napi_env,
    object: napi_value,
    constructor: napi_value,
    result: *mut bool,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.instanceof(handle(object)?, handle(constructor)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_is_array(env: napi_env, value: napi_value, result: *mut bool) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.is_array(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_is_error(env: napi_env, value: napi_value, result: *mut bool) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.is_error(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_is_promise(env: napi_env, value: napi_value, result: *mut bool) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.is_promise(handle(value)?)?)) }
}

// ============================================================================
// Objects and properties
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_object(env: napi_env, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_object()?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_array(env: napi_env, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_array()?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_array_with_length(
    env: napi_env,
    length: usize,
    result: *mut napi_value,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_array_with_length(length)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_array_length(env: napi_env, value: napi_value, result: *mut u32) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.get_array_length(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_set_property(
    env: napi_env,
    object: napi_value,
    key: napi_value,
    value: napi_value,
) -> napi_status {
    unsafe { with_env(env, |env| env.set_property(handle(object)?, handle(key)?, handle(value)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_property(
    env: napi_env,
    object: napi_value,
    key: napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.get_property(handle(object)?, handle(key)?)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_has_property(
    env: napi_env,
    object: napi_value,
    key: napi_value,
    result: *mut bool,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.has_property(handle(object)?, handle(key)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_delete_property(
    env: napi_env,
    object: napi_value,
    key: napi_value,
    result: *mut bool,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let deleted = env.delete_property(handle(object)?, handle(key)?)?;
            set_opt(result, deleted);
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_has_own_property(
    env: napi_env,
    object: napi_value,
    key: napi_value,
    result: *mut bool,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.has_own_property(handle(object)?, handle(key)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_has_own_named_property(
    env: napi_env,
    object: napi_value,
    name: *const c_char,
    result: *mut bool,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let name = utf8(name, NAPI_AUTO_LENGTH)?;
            set(result, env.has_own_named_property(handle(object)?, &name)?)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_set_named_property(
    env: napi_env,
    object: napi_value,
    name: *const c_char,
    value: napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let name = utf8(name, NAPI_AUTO_LENGTH)?;
            env.set_named_property(handle(object)?, &name, handle(value)?)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_named_property(
    env: napi_env,
    object: napi_value,
    name: *const c_char,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let name = utf8(name, NAPI_AUTO_LENGTH)?;
            set(result, to_napi(env.get_named_property(handle(object)?, &name)?))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_has_named_property(
    env: napi_env,
    object: napi_value,
    name: *const c_char,
    result: *mut bool,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let name = utf8(name, NAPI_AUTO_LENGTH)?;
            set(result, env.has_named_property(handle(object)?, &name)?)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_set_element(
    env: napi_env,
    object: napi_value,
    index: u32,
    value: napi_value,
) -> napi_status {
    unsafe { with_env(env, |env| env.set_element(handle(object)?, index, handle(value)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_element(
    env: napi_env,
    object: napi_value,
    index: u32,
    result: *mut napi_value,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.get_element(handle(object)?, index)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_has_element(
    env: napi_env,
    object: napi_value,
    index: u32,
    result: *mut bool,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.has_element(handle(object)?, index)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_delete_element(
    env: napi_env,
    object: napi_value,
    index: u32,
    result: *mut bool,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let deleted = env.delete_element(handle(object)?, index)?;
            set_opt(result, deleted);
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_property_names(
    env: napi_env,
    object: napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.get_property_names(handle(object)?)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_all_property_names(
    env: napi_env,
    object: napi_value,
    key_mode: c_int,
    key_filter: u32,
    key_conversion: c_int,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let mode = match key_mode {
                0 => KeyCollectionMode::IncludePrototypes,
                1 => KeyCollectionMode::OwnOnly,
                _ => return Err(Status::InvalidArg),
            };
            let conversion = match key_conversion {
                0 => KeyConversion::KeepNumbers,
                1 => KeyConversion::NumbersToStrings,
                _ => return Err(Status::InvalidArg),
            };
            let names = env.get_all_property_names(
                handle(object)?,
                mode,
                KeyFilter::from_bits(key_filter),
                conversion,
            )?;
            set(result, to_napi(names))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_prototype(env: napi_env, object: napi_value, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.get_prototype(handle(object)?)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_object_freeze(env: napi_env, object: napi_value) -> napi_status {
    unsafe { with_env(env, |env| env.object_freeze(handle(object)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_object_seal(env: napi_env, object: napi_value) -> napi_status {
    unsafe { with_env(env, |env| env.object_seal(handle(object)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_define_properties(
    env: napi_env,
    object: napi_value,
    property_count: usize,
    properties: *const napi_property_descriptor,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let properties = descriptors(property_count, properties)?;
            env.define_properties(handle(object)?, &properties)
        })
    }
}

// ============================================================================
// Functions and classes
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_function(
    env: napi_env,
    utf8name: *const c_char,
    length: usize,
    cb: napi_callback,
    data: *mut c_void,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let cb = cb.ok_or(Status::InvalidArg)?;
            let name = utf8(utf8name, if utf8name.is_null() { 0 } else { length })?;
            set(result, to_napi(env.create_function(&name, data, native_callback(cb))?))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_define_class(
    env: napi_env,
    utf8name: *const c_char,
    length: usize,
    constructor: napi_callback,
    data: *mut c_void,
    property_count: usize,
    properties: *const napi_property_descriptor,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let constructor = constructor.ok_or(Status::InvalidArg)?;
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let name = utf8(utf8name, length)?;
            let properties = descriptors(property_count, properties)?;
            let class = env.define_class(&name, data, native_callback(constructor), &properties)?;
            set(result, to_napi(class))
        })
    }
}

/// Arguments, receiver and data of the current call
///
/// On input `*argc` is the capacity of `argv`; missing arguments are filled with
/// `undefined`. On output it holds the actual argument count.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_cb_info(
    env: napi_env,
    cbinfo: napi_callback_info,
    argc: *mut usize,
    argv: *mut napi_value,
    this_arg: *mut napi_value,
    data: *mut *mut c_void,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let info = cbinfo.as_ref().ok_or(Status::InvalidArg)?;
            if !argc.is_null() {
                if !argv.is_null() {
                    let args = env.get_cb_info(info, *argc)?;
                    for (index, arg) in args.into_iter().enumerate() {
                        argv.add(index).write(to_napi(arg));
                    }
                }
                argc.write(info.len());
            }
            set_opt(this_arg, to_napi(info.this()));
            set_opt(data, info.data());
            Ok(())
        })
    }
}

/// `new.target` of a constructor call, or null for a plain call
#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_new_target(
    env: napi_env,
    cbinfo: napi_callback_info,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let info = cbinfo.as_ref().ok_or(Status::InvalidArg)?;
            let target = env.get_new_target(info)?;
            set(result, target.map_or(ptr::null_mut(), to_napi))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_call_function(
    env: napi_env,
    recv: napi_value,
    func: napi_value,
    argc: usize,
    argv: *const napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let args = handles(argc, argv)?;
            let returned = env.call_function(Some(handle(recv)?), handle(func)?, &args)?;
            set_opt(result, to_napi(returned));
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_new_instance(
    env: napi_env,
    constructor: napi_value,
    argc: usize,
    argv: *const napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let args = handles(argc, argv)?;
            set(result, to_napi(env.new_instance(handle(constructor)?, &args)?))
        })
    }
}

// ============================================================================
// Exceptions
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_throw(env: napi_env, error: napi_value) -> napi_status {
    unsafe { with_env(env, |env| env.throw(handle(error)?)) }
}

/// # Safety
/// `code` must be null or NUL-terminated; `msg` must be NUL-terminated.
unsafe fn throw_with(
    env: napi_env,
    code: *const c_char,
    msg: *const c_char,
    throw: impl FnOnce(&Env, Option<&str>, &str) -> NapiResult<()>,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let message = utf8(msg, NAPI_AUTO_LENGTH)?;
            let code = if code.is_null() { None } else { Some(utf8(code, NAPI_AUTO_LENGTH)?) };
            throw(env, code.as_deref(), &message)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_throw_error(env: napi_env, code: *const c_char, msg: *const c_char) -> napi_status {
    unsafe { throw_with(env, code, msg, Env::throw_error) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_throw_type_error(
    env: napi_env,
    code: *const c_char,
    msg: *const c_char,
) -> napi_status {
    unsafe { throw_with(env, code, msg, Env::throw_type_error) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_throw_range_error(
    env: napi_env,
    code: *const c_char,
    msg: *const c_char,
) -> napi_status {
    unsafe { throw_with(env, code, msg, Env::throw_range_error) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn node_api_throw_syntax_error(
    env: napi_env,
    code: *const c_char,
    msg: *const c_char,
) -> napi_status {
    unsafe { throw_with(env, code, msg, Env::throw_syntax_error) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_is_exception_pending(env: napi_env, result: *mut bool) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.is_exception_pending()?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_and_clear_last_exception(env: napi_env, result: *mut napi_value) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            set(result, to_napi(env.get_and_clear_last_exception()?))
        })
    }
}

/// # Safety
/// Handles must be null or valid; `result` must be writable.
unsafe fn create_with(
    env: napi_env,
    code: napi_value,
    msg: napi_value,
    result: *mut napi_value,
    create: impl FnOnce(&Env, Option<Value>, Value) -> NapiResult<Value>,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let error = create(env, optional(code), handle(msg)?)?;
            set(result, to_napi(error))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_error(
    env: napi_env,
    code: napi_value,
    msg: napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe { create_with(env, code, msg, result, Env::create_error) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_type_error(
    env: napi_env,
    code: napi_value,
    msg: napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe { create_with(env, code, msg, result, Env::create_type_error) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_range_error(
    env: napi_env,
    code: napi_value,
    msg: napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe { create_with(env, code, msg, result, Env::create_range_error) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn node_api_create_syntax_error(
    env: napi_env,
    code: napi_value,
    msg: napi_value,
    result: *mut napi_value,
) -> napi_status {
    unsafe { create_with(env, code, msg, result, Env::create_syntax_error) }
}

// ============================================================================
// References
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_reference(
    env: napi_env,
    value: napi_value,
    initial_refcount: u32,
    result: *mut napi_ref,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let created = env.create_reference(handle(value)?, initial_refcount)?;
            set(result, created.to_bits() as napi_ref)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_delete_reference(env: napi_env, reference_: napi_ref) -> napi_status {
    unsafe { with_env(env, |env| env.delete_reference(reference(reference_)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_reference_ref(env: napi_env, reference_: napi_ref, result: *mut u32) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let count = env.reference_ref(reference(reference_)?)?;
            set_opt(result, count);
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_reference_unref(env: napi_env, reference_: napi_ref, result: *mut u32) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let count = env.reference_unref(reference(reference_)?)?;
            set_opt(result, count);
            Ok(())
        })
    }
}

/// Referenced value, or null once a weak referent has been collected
#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_reference_value(
    env: napi_env,
    reference_: napi_ref,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let value = env.get_reference_value(reference(reference_)?)?;
            set(result, value.map_or(ptr::null_mut(), to_napi))
        })
    }
}

// ============================================================================
// Externals, wraps and type tags
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_external(
    env: napi_env,
    data: *mut c_void,
    finalize_cb: napi_finalize,
    finalize_hint: *mut c_void,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let external = env.create_external(data, native_finalize(finalize_cb), finalize_hint)?;
            set(result, to_napi(external))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_external(
    env: napi_env,
    value: napi_value,
    result: *mut *mut c_void,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.get_value_external(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_wrap(
    env: napi_env,
    js_object: napi_value,
    native_object: *mut c_void,
    finalize_cb: napi_finalize,
    finalize_hint: *mut c_void,
    result: *mut napi_ref,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let created = env.wrap(
                handle(js_object)?,
                native_object,
                native_finalize(finalize_cb),
                finalize_hint,
                !result.is_null(),
            )?;
            if let Some(created) = created {
                set(result, created.to_bits() as napi_ref)?;
            }
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_unwrap(env: napi_env, js_object: napi_value, result: *mut *mut c_void) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.unwrap(handle(js_object)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_remove_wrap(
    env: napi_env,
    js_object: napi_value,
    result: *mut *mut c_void,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let data = env.remove_wrap(handle(js_object)?)?;
            set_opt(result, data);
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_add_finalizer(
    env: napi_env,
    js_object: napi_value,
    finalize_data: *mut c_void,
    finalize_cb: napi_finalize,
    finalize_hint: *mut c_void,
    result: *mut napi_ref,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let finalize = native_finalize(finalize_cb).ok_or(Status::InvalidArg)?;
            let created = env.add_finalizer(
                handle(js_object)?,
                finalize_data,
                finalize,
                finalize_hint,
                !result.is_null(),
            )?;
            if let Some(created) = created {
                set(result, created.to_bits() as napi_ref)?;
            }
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_type_tag_object(
    env: napi_env,
    value: napi_value,
    type_tag: *const napi_type_tag,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let tag = type_tag.as_ref().ok_or(Status::InvalidArg)?;
            env.type_tag_object(handle(value)?, tag)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_check_object_type_tag(
    env: napi_env,
    value: napi_value,
    type_tag: *const napi_type_tag,
    result: *mut bool,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let tag = type_tag.as_ref().ok_or(Status::InvalidArg)?;
            set(result, env.check_object_type_tag(handle(value)?, tag)?)
        })
    }
}

// ============================================================================
// Promises and scripts
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_promise(
    env: napi_env,
    deferred: *mut napi_deferred,
    promise: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if deferred.is_null() || promise.is_null() {
                return Err(Status::InvalidArg);
            }
            let (created, value) = env.create_promise()?;
            deferred.write(created.into_bits() as napi_deferred);
            promise.write(to_napi(value));
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_resolve_deferred(
    env: napi_env,
    deferred: napi_deferred,
    resolution: napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let deferred = Deferred::from_bits(deferred as usize).ok_or(Status::InvalidArg)?;
            env.resolve_deferred(deferred, handle(resolution)?)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_reject_deferred(
    env: napi_env,
    deferred: napi_deferred,
    rejection: napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let deferred = Deferred::from_bits(deferred as usize).ok_or(Status::InvalidArg)?;
            env.reject_deferred(deferred, handle(rejection)?)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_run_script(env: napi_env, script: napi_value, result: *mut napi_value) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            set(result, to_napi(env.run_script(handle(script)?)?))
        })
    }
}

// ============================================================================
// Dates and BigInts
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_date(env: napi_env, time: f64, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_date(time)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_is_date(env: napi_env, value: napi_value, result: *mut bool) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.is_date(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_date_value(env: napi_env, value: napi_value, result: *mut f64) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.get_date_value(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_bigint_int64(env: napi_env, value: i64, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_bigint_int64(value)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_bigint_uint64(env: napi_env, value: u64, result: *mut napi_value) -> napi_status {
    unsafe { with_env(env, |env| set(result, to_napi(env.create_bigint_uint64(value)?))) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_bigint_words(
    env: napi_env,
    sign_bit: c_int,
    word_count: usize,
    words: *const u64,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let words = if word_count == 0 {
                &[][..]
            } else if words.is_null() {
                return Err(Status::InvalidArg);
            } else {
                slice::from_raw_parts(words, word_count)
            };
            set(result, to_napi(env.create_bigint_words(sign_bit != 0, words)?))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_bigint_int64(
    env: napi_env,
    value: napi_value,
    result: *mut i64,
    lossless: *mut bool,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let (truncated, exact) = env.get_value_bigint_int64(handle(value)?)?;
            set(lossless, exact)?;
            set(result, truncated)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_bigint_uint64(
    env: napi_env,
    value: napi_value,
    result: *mut u64,
    lossless: *mut bool,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let (truncated, exact) = env.get_value_bigint_uint64(handle(value)?)?;
            set(lossless, exact)?;
            set(result, truncated)
        })
    }
}

/// Sign and words of a BigInt
///
/// With a null `words` only the needed count is reported. Otherwise up to
/// `*word_count` words are copied and the count is set to the number written.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_value_bigint_words(
    env: napi_env,
    value: napi_value,
    sign_bit: *mut c_int,
    word_count: *mut usize,
    words: *mut u64,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if word_count.is_null() {
                return Err(Status::InvalidArg);
            }
            let bigint = env.get_value_bigint_words(handle(value)?)?;
            if words.is_null() {
                word_count.write(bigint.words.len());
                return Ok(());
            }
            let copied = bigint.words.len().min(*word_count);
            ptr::copy_nonoverlapping(bigint.words.as_ptr(), words, copied);
            word_count.write(copied);
            set(sign_bit, c_int::from(bigint.negative))
        })
    }
}

// ============================================================================
// Array buffers, buffers, typed arrays and data views
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_arraybuffer(
    env: napi_env,
    byte_length: usize,
    data: *mut *mut c_void,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let (buffer, bytes) = env.create_arraybuffer(byte_length)?;
            set_opt(data, bytes.cast());
            set(result, to_napi(buffer))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_external_arraybuffer(
    env: napi_env,
    external_data: *mut c_void,
    byte_length: usize,
    finalize_cb: napi_finalize,
    finalize_hint: *mut c_void,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let buffer = env.create_external_arraybuffer(
                external_data,
                byte_length,
                native_finalize(finalize_cb),
                finalize_hint,
            )?;
            set(result, to_napi(buffer))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_arraybuffer_info(
    env: napi_env,
    arraybuffer: napi_value,
    data: *mut *mut c_void,
    byte_length: *mut usize,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let (bytes, length) = env.get_arraybuffer_info(handle(arraybuffer)?)?;
            set_opt(data, bytes.cast());
            set_opt(byte_length, length);
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_is_arraybuffer(env: napi_env, value: napi_value, result: *mut bool) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.is_arraybuffer(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_detach_arraybuffer(env: napi_env, arraybuffer: napi_value) -> napi_status {
    unsafe { with_env(env, |env| env.detach_arraybuffer(handle(arraybuffer)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_is_detached_arraybuffer(
    env: napi_env,
    value: napi_value,
    result: *mut bool,
) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.is_detached_arraybuffer(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_buffer(
    env: napi_env,
    size: usize,
    data: *mut *mut c_void,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let (buffer, bytes) = env.create_buffer(size)?;
            set_opt(data, bytes.cast());
            set(result, to_napi(buffer))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_buffer_copy(
    env: napi_env,
    length: usize,
    data: *const c_void,
    result_data: *mut *mut c_void,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let source = units(data.cast::<u8>(), length)?;
            let (buffer, bytes) = env.create_buffer_copy(source)?;
            set_opt(result_data, bytes.cast());
            set(result, to_napi(buffer))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_external_buffer(
    env: napi_env,
    length: usize,
    data: *mut c_void,
    finalize_cb: napi_finalize,
    finalize_hint: *mut c_void,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let buffer =
                env.create_external_buffer(data, length, native_finalize(finalize_cb), finalize_hint)?;
            set(result, to_napi(buffer))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_is_buffer(env: napi_env, value: napi_value, result: *mut bool) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.is_buffer(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_buffer_info(
    env: napi_env,
    value: napi_value,
    data: *mut *mut c_void,
    length: *mut usize,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let (bytes, len) = env.get_buffer_info(handle(value)?)?;
            set_opt(data, bytes.cast());
            set_opt(length, len);
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_typedarray(
    env: napi_env,
    kind: napi_typedarray_type,
    length: usize,
    arraybuffer: napi_value,
    byte_offset: usize,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let kind = TypedArrayType::from_raw(kind).ok_or(Status::InvalidArg)?;
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let array = env.create_typedarray(kind, length, handle(arraybuffer)?, byte_offset)?;
            set(result, to_napi(array))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_is_typedarray(env: napi_env, value: napi_value, result: *mut bool) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.is_typedarray(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_typedarray_info(
    env: napi_env,
    typedarray: napi_value,
    kind: *mut napi_typedarray_type,
    length: *mut usize,
    data: *mut *mut c_void,
    arraybuffer: *mut napi_value,
    byte_offset: *mut usize,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let info = env.get_typedarray_info(handle(typedarray)?)?;
            set_opt(kind, info.kind as napi_typedarray_type);
            set_opt(length, info.length);
            set_opt(data, info.data.cast());
            set_opt(arraybuffer, to_napi(info.arraybuffer));
            set_opt(byte_offset, info.byte_offset);
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_create_dataview(
    env: napi_env,
    byte_length: usize,
    arraybuffer: napi_value,
    byte_offset: usize,
    result: *mut napi_value,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            if result.is_null() {
                return Err(Status::InvalidArg);
            }
            let view = env.create_dataview(byte_length, handle(arraybuffer)?, byte_offset)?;
            set(result, to_napi(view))
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_is_dataview(env: napi_env, value: napi_value, result: *mut bool) -> napi_status {
    unsafe { with_env(env, |env| set(result, env.is_dataview(handle(value)?)?)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn napi_get_dataview_info(
    env: napi_env,
    dataview: napi_value,
    byte_length: *mut usize,
    data: *mut *mut c_void,
    arraybuffer: *mut napi_value,
    byte_offset: *mut usize,
) -> napi_status {
    unsafe {
        with_env(env, |env| {
            let info = env.get_dataview_info(handle(dataview)?)?;
            set_opt(byte_length, info.byte_length);
            set_opt(data, info.data.cast());
            set_opt(arraybuffer, to_napi(info.arraybuffer));
            set_opt(byte_offset, info.byte_offset);
            Ok(())
        })
    }
}
