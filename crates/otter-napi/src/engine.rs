//! Shared plumbing over the raw QuickJS-NG bindings
//!
//! The rest of the crate talks to the engine through `qjs` plus the small helpers
//! below. Engine values are reference counted: a `JSValue` returned by the engine is
//! owned (+1) unless the call is documented as borrowing, and [`Owned`] releases that
//! count on drop.

use std::ffi::{CString, c_int, c_void};
use std::mem;
use std::ptr;

pub(crate) use rquickjs_sys as qjs;
pub(crate) use qjs::{JSAtom, JSClassID, JSContext, JSRuntime, JSValue};

use crate::error::{NapiResult, Status};

pub(crate) const PROP_CONFIGURABLE: c_int = 1 << 0;
pub(crate) const PROP_WRITABLE: c_int = 1 << 1;
pub(crate) const PROP_ENUMERABLE: c_int = 1 << 2;
pub(crate) const PROP_THROW: c_int = 1 << 14;

pub(crate) const EVAL_TYPE_GLOBAL: c_int = 0;

pub(crate) const ATOM_NULL: JSAtom = 0;

/// Normalized engine tag of a value
#[inline]
pub(crate) fn tag(value: JSValue) -> i32 {
    // SAFETY: reading the tag never dereferences the value
    unsafe { qjs::JS_VALUE_GET_NORM_TAG(value) as i32 }
}

#[inline]
pub(crate) fn is_object(value: JSValue) -> bool {
    tag(value) == qjs::JS_TAG_OBJECT as i32
}

#[inline]
pub(crate) fn is_exception(value: JSValue) -> bool {
    tag(value) == qjs::JS_TAG_EXCEPTION as i32
}

#[inline]
pub(crate) fn is_null(value: JSValue) -> bool {
    tag(value) == qjs::JS_TAG_NULL as i32
}

#[inline]
pub(crate) fn is_undefined(value: JSValue) -> bool {
    tag(value) == qjs::JS_TAG_UNDEFINED as i32
}

#[inline]
pub(crate) fn is_number(value: JSValue) -> bool {
    let t = tag(value);
    t == qjs::JS_TAG_INT as i32 || t == qjs::JS_TAG_FLOAT64 as i32
}

#[inline]
pub(crate) fn is_string(value: JSValue) -> bool {
    tag(value) == qjs::JS_TAG_STRING as i32
}

#[inline]
pub(crate) fn is_bool(value: JSValue) -> bool {
    tag(value) == qjs::JS_TAG_BOOL as i32
}

/// Engine predicates return `bool` or `int` depending on the header revision
#[inline]
pub(crate) fn truthy<T: Into<i32>>(flag: T) -> bool {
    flag.into() != 0
}

/// An engine value whose reference count this wrapper owns
pub(crate) struct Owned {
    ctx: *mut JSContext,
    value: JSValue,
}

impl Owned {
    /// Take ownership of one reference to `value`
    ///
    /// # Safety
    /// `ctx` must be live and the caller must transfer one reference count.
    pub(crate) unsafe fn new(ctx: *mut JSContext, value: JSValue) -> Self {
        Self { ctx, value }
    }

    /// Duplicate a borrowed value into an owned one
    ///
    /// # Safety
    /// `ctx` must be live and `value` must belong to it.
    pub(crate) unsafe fn dup(ctx: *mut JSContext, value: JSValue) -> Self {
        // SAFETY: forwarded from the caller
        unsafe { Self::new(ctx, qjs::JS_DupValue(ctx, value)) }
    }

    pub(crate) fn raw(&self) -> JSValue {
        self.value
    }

    /// Give up ownership without releasing the reference
    pub(crate) fn into_raw(self) -> JSValue {
        let value = self.value;
        mem::forget(self);
        value
    }
}

impl Drop for Owned {
    fn drop(&mut self) {
        // SAFETY: this wrapper owns exactly one reference
        unsafe { qjs::JS_FreeValue(self.ctx, self.value) };
    }
}

/// Wrap a freshly returned value, mapping the exception sentinel to a status
///
/// # Safety
/// `ctx` must be live and `value` must be owned by the caller.
pub(crate) unsafe fn checked(ctx: *mut JSContext, value: JSValue) -> NapiResult<Owned> {
    if is_exception(value) {
        return Err(Status::PendingException);
    }
    // SAFETY: forwarded from the caller
    Ok(unsafe { Owned::new(ctx, value) })
}

/// What the engine currently holds in its exception slot
pub(crate) enum Pending {
    Clear,
    Null,
    Value(JSValue),
}

/// Remove the engine's pending exception, if any
///
/// The engine marks "no exception" with an uninitialized value, so a thrown `null`
/// is reported separately from a clear slot.
///
/// # Safety
/// `ctx` must be live.
pub(crate) unsafe fn take_exception(ctx: *mut JSContext) -> Pending {
    // SAFETY: ctx is live per caller contract
    let exception = unsafe { qjs::JS_GetException(ctx) };
    let t = tag(exception);
    if t == qjs::JS_TAG_UNINITIALIZED as i32 {
        Pending::Clear
    } else if t == qjs::JS_TAG_NULL as i32 {
        Pending::Null
    } else {
        Pending::Value(exception)
    }
}

/// Call `func` with borrowed arguments
///
/// # Safety
/// `ctx` must be live and every value must belong to it.
pub(crate) unsafe fn call(
    ctx: *mut JSContext,
    func: JSValue,
    this: JSValue,
    args: &[JSValue],
) -> NapiResult<Owned> {
    // SAFETY: the engine reads argv without writing to it
    unsafe {
        let result = qjs::JS_Call(
            ctx,
            func,
            this,
            args.len() as c_int,
            args.as_ptr() as *mut JSValue,
        );
        checked(ctx, result)
    }
}

/// Create an engine string from UTF-8
///
/// # Safety
/// `ctx` must be live.
pub(crate) unsafe fn new_string(ctx: *mut JSContext, s: &str) -> NapiResult<Owned> {
    // SAFETY: pointer and length describe a valid UTF-8 buffer
    unsafe { checked(ctx, qjs::JS_NewStringLen(ctx, s.as_ptr().cast(), s.len() as _)) }
}

/// Convert a value to a Rust string through the engine's `ToString`
///
/// # Safety
/// `ctx` must be live and `value` must belong to it.
pub(crate) unsafe fn to_rust_string(ctx: *mut JSContext, value: JSValue) -> NapiResult<String> {
    let mut len: qjs::size_t = 0;
    // SAFETY: the returned buffer is valid for `len` bytes until freed
    unsafe {
        let cstr = qjs::JS_ToCStringLen2(ctx, &mut len, value, false);
        if cstr.is_null() {
            return Err(Status::PendingException);
        }
        let bytes = std::slice::from_raw_parts(cstr.cast::<u8>(), len as usize);
        let out = String::from_utf8_lossy(bytes).into_owned();
        qjs::JS_FreeCString(ctx, cstr);
        Ok(out)
    }
}

/// Evaluate a global script
///
/// # Safety
/// `ctx` must be live.
pub(crate) unsafe fn eval(ctx: *mut JSContext, source: &str, filename: &str) -> NapiResult<Owned> {
    let source = CString::new(source).map_err(|_| Status::InvalidArg)?;
    let filename = CString::new(filename).map_err(|_| Status::InvalidArg)?;
    let len = source.as_bytes().len();
    // SAFETY: the source is NUL-terminated as the parser requires
    unsafe {
        let result = qjs::JS_Eval(ctx, source.as_ptr(), len as _, filename.as_ptr(), EVAL_TYPE_GLOBAL);
        checked(ctx, result)
    }
}

/// # Safety
/// `ctx` must be live and `value` must belong to it.
pub(crate) unsafe fn to_f64(ctx: *mut JSContext, value: JSValue) -> NapiResult<f64> {
    let mut out = 0.0f64;
    // SAFETY: forwarded from the caller
    if unsafe { qjs::JS_ToFloat64(ctx, &mut out, value) } < 0 {
        return Err(Status::PendingException);
    }
    Ok(out)
}

#[inline]
pub(crate) fn new_int32(value: i32) -> JSValue {
    qjs::JS_MKVAL(qjs::JS_TAG_INT as i32, value)
}

/// Doubles holding an exact 32-bit integer are stored as ints
#[inline]
pub(crate) fn new_float64(value: f64) -> JSValue {
    qjs::JS_NewFloat64(value)
}

/// Integers outside the 32-bit range become doubles
#[inline]
pub(crate) fn new_int64(value: i64) -> JSValue {
    match i32::try_from(value) {
        Ok(small) => new_int32(small),
        Err(_) => new_float64(value as f64),
    }
}

/// RAII guard for an interned property key
pub(crate) struct Atom {
    ctx: *mut JSContext,
    atom: JSAtom,
}

impl Atom {
    /// # Safety
    /// `ctx` must be live.
    pub(crate) unsafe fn new(ctx: *mut JSContext, name: &str) -> NapiResult<Self> {
        // SAFETY: pointer and length describe a valid buffer
        let atom = unsafe { qjs::JS_NewAtomLen(ctx, name.as_ptr().cast(), name.len() as _) };
        if atom == ATOM_NULL {
            return Err(Status::MemoryError);
        }
        Ok(Self { ctx, atom })
    }

    /// Property key for a string, number or symbol value
    ///
    /// # Safety
    /// `ctx` must be live and `value` must belong to it.
    pub(crate) unsafe fn from_value(ctx: *mut JSContext, value: JSValue) -> NapiResult<Self> {
        // SAFETY: forwarded from the caller
        let atom = unsafe { qjs::JS_ValueToAtom(ctx, value) };
        if atom == ATOM_NULL {
            return Err(Status::PendingException);
        }
        Ok(Self { ctx, atom })
    }

    pub(crate) fn raw(&self) -> JSAtom {
        self.atom
    }
}

impl Drop for Atom {
    fn drop(&mut self) {
        // SAFETY: the guard owns the atom
        unsafe { qjs::JS_FreeAtom(self.ctx, self.atom) };
    }
}

/// # Safety
/// `ctx` must be live and `array` must belong to it.
pub(crate) unsafe fn array_get(ctx: *mut JSContext, array: JSValue, index: u32) -> NapiResult<Owned> {
    // SAFETY: forwarded from the caller
    unsafe { checked(ctx, qjs::JS_GetPropertyUint32(ctx, array, index)) }
}

/// Build an array, consuming every element
///
/// # Safety
/// `ctx` must be live and the elements must belong to it.
pub(crate) unsafe fn array_from(
    ctx: *mut JSContext,
    elements: impl IntoIterator<Item = Owned>,
) -> NapiResult<Owned> {
    // SAFETY: every element reference is handed to the engine exactly once
    unsafe {
        let array = checked(ctx, qjs::JS_NewArray(ctx))?;
        for (index, element) in elements.into_iter().enumerate() {
            if qjs::JS_SetPropertyUint32(ctx, array.raw(), index as u32, element.into_raw()) < 0 {
                return Err(Status::PendingException);
            }
        }
        Ok(array)
    }
}

/// Allocate an object of a registered class and attach `opaque`
///
/// The opaque pointer is attached only after the object exists, so a failed
/// allocation never leaves a payload behind.
///
/// # Safety
/// `ctx` must be live, `class_id` registered, and `opaque` valid for the class
/// finalizer to reclaim.
pub(crate) unsafe fn new_class_object(
    ctx: *mut JSContext,
    proto: JSValue,
    class_id: JSClassID,
    opaque: *mut c_void,
) -> NapiResult<Owned> {
    if class_id == 0 {
        crate::error::fatal_error("new_class_object", "class id used before registration");
    }
    // SAFETY: the class is registered, the pointer is handed to its finalizer
    unsafe {
        let object = checked(ctx, qjs::JS_NewObjectProtoClass(ctx, proto, class_id as _))?;
        qjs::JS_SetOpaque(object.raw(), opaque);
        Ok(object)
    }
}

/// Prototype-less carrier object for native payloads
///
/// # Safety
/// Same contract as [`new_class_object`].
pub(crate) unsafe fn new_carrier(
    ctx: *mut JSContext,
    class_id: JSClassID,
    opaque: *mut c_void,
) -> NapiResult<Owned> {
    // SAFETY: forwarded from the caller
    unsafe { new_class_object(ctx, qjs::JS_NULL, class_id, opaque) }
}

/// Drop whatever exception the engine holds
///
/// # Safety
/// `ctx` must be live.
pub(crate) unsafe fn discard_exception(ctx: *mut JSContext) {
    // SAFETY: the taken exception is owned and released here
    unsafe {
        if let Pending::Value(exception) = take_exception(ctx) {
            qjs::JS_FreeValue(ctx, exception);
        }
    }
}

/// Whether `value` is callable
///
/// # Safety
/// `ctx` must be live.
pub(crate) unsafe fn is_function(ctx: *mut JSContext, value: JSValue) -> bool {
    // SAFETY: forwarded from the caller
    is_object(value) && truthy(unsafe { qjs::JS_IsFunction(ctx, value) })
}

/// Borrow the opaque payload of an object if it belongs to `class_id`
///
/// # Safety
/// `value` must be a live engine value.
pub(crate) unsafe fn opaque<T>(value: JSValue, class_id: JSClassID) -> *mut T {
    if !is_object(value) {
        return ptr::null_mut();
    }
    // SAFETY: the engine checks the class id before returning the payload
    unsafe { qjs::JS_GetOpaque(value, class_id as _).cast() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_of_constants() {
        assert!(is_undefined(qjs::JS_UNDEFINED));
        assert!(is_null(qjs::JS_NULL));
        assert!(is_bool(qjs::JS_TRUE));
        assert!(is_exception(qjs::JS_EXCEPTION));
        assert!(!is_object(qjs::JS_NULL));
        assert!(!is_number(qjs::JS_UNDEFINED));
    }

    #[test]
    fn test_truthy_accepts_both_flag_types() {
        assert!(truthy(true));
        assert!(!truthy(false));
        assert!(truthy(1i32));
        assert!(!truthy(0i32));
    }
}
