//! Array buffers, buffers, typed arrays and DataViews
//!
//! The engine has a single byte-store type, so a "buffer" is an `ArrayBuffer`
//! carrying a hidden tag. Externally backed stores hand their finalizer to the
//! environment's queue when the engine frees or detaches them.

use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;

use crate::engine::{self, JSRuntime, JSValue, Owned, qjs};
use crate::env::{Core, Env};
use crate::error::{NapiResult, Status};
use crate::exception::ErrorKind;
use crate::external::{ExternalInfo, Finalize, FinalizerQueue};
use crate::scope::Value;

/// Element kind of a typed array, numbered like `napi_typedarray_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TypedArrayType {
    Int8 = 0,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    BigInt64,
    BigUint64,
}

impl TypedArrayType {
    pub fn element_size(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 | Self::Uint8Clamped => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Float64 | Self::BigInt64 | Self::BigUint64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Int8 => "Int8Array",
            Self::Uint8 => "Uint8Array",
            Self::Uint8Clamped => "Uint8ClampedArray",
            Self::Int16 => "Int16Array",
            Self::Uint16 => "Uint16Array",
            Self::Int32 => "Int32Array",
            Self::Uint32 => "Uint32Array",
            Self::Float32 => "Float32Array",
            Self::Float64 => "Float64Array",
            Self::BigInt64 => "BigInt64Array",
            Self::BigUint64 => "BigUint64Array",
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        const ALL: [TypedArrayType; 11] = [
            TypedArrayType::Int8,
            TypedArrayType::Uint8,
            TypedArrayType::Uint8Clamped,
            TypedArrayType::Int16,
            TypedArrayType::Uint16,
            TypedArrayType::Int32,
            TypedArrayType::Uint32,
            TypedArrayType::Float32,
            TypedArrayType::Float64,
            TypedArrayType::BigInt64,
            TypedArrayType::BigUint64,
        ];
        usize::try_from(raw).ok().and_then(|i| ALL.get(i).copied())
    }
}

/// Layout of a typed array over its backing buffer
#[derive(Debug, Clone, Copy)]
pub struct TypedArrayInfo {
    pub kind: TypedArrayType,
    /// Number of elements
    pub length: usize,
    /// First element; null when the buffer is detached
    pub data: *mut u8,
    pub arraybuffer: Value,
    pub byte_offset: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct DataViewInfo {
    pub byte_length: usize,
    pub data: *mut u8,
    pub arraybuffer: Value,
    pub byte_offset: usize,
}

/// Opaque of an externally backed store
struct ExternalStore {
    info: ExternalInfo,
    queue: Rc<FinalizerQueue>,
}

/// Free callback of externally backed stores
///
/// The engine may call this twice for a store that was detached first; the second
/// call carries a null data pointer and is ignored.
unsafe extern "C" fn free_external_store(_rt: *mut JSRuntime, opaque: *mut c_void, data: *mut c_void) {
    if data.is_null() || opaque.is_null() {
        return;
    }
    // SAFETY: the opaque was leaked by create_external_arraybuffer and is freed once
    let store = unsafe { Box::from_raw(opaque.cast::<ExternalStore>()) };
    let ExternalStore { mut info, queue } = *store;
    if let Some(armed) = info.take() {
        queue.push(armed);
    }
}

impl Env {
    /// Data pointer and length of an array buffer; null for a detached one
    ///
    /// # Safety
    /// `value` must be a live `ArrayBuffer` of `core.ctx`.
    unsafe fn arraybuffer_bytes(&self, core: Core, value: JSValue) -> (*mut u8, usize) {
        let mut len: qjs::size_t = 0;
        // SAFETY: forwarded from the caller
        unsafe {
            let data = qjs::JS_GetArrayBuffer(core.ctx, &mut len, value);
            if data.is_null() {
                engine::discard_exception(core.ctx);
                return (ptr::null_mut(), 0);
            }
            (data, len as usize)
        }
    }

    /// Plain `ArrayBuffer` test, buffers included
    ///
    /// # Safety
    /// `value` must be live in `core.ctx`.
    unsafe fn is_arraybuffer_raw(&self, core: Core, value: JSValue) -> NapiResult<bool> {
        if !engine::is_object(value) {
            return Ok(false);
        }
        // SAFETY: forwarded from the caller
        unsafe { self.predicate(core, core.helpers.is_arraybuffer, &[value]) }
    }

    /// # Safety
    /// `value` must be live in `core.ctx`.
    unsafe fn is_buffer_raw(&self, core: Core, value: JSValue) -> NapiResult<bool> {
        if !engine::is_object(value) {
            return Ok(false);
        }
        // SAFETY: forwarded from the caller
        let mark = unsafe { core.helpers.table_get(core.ctx, core.helpers.buffers, value)? };
        Ok(mark.is_some())
    }

    fn arraybuffer(&self, value: Value) -> NapiResult<(Core, JSValue)> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is live while its handle is
        if !unsafe { self.is_arraybuffer_raw(core, raw)? } {
            return Err(Status::ArraybufferExpected);
        }
        Ok((core, raw))
    }

    /// # Safety
    /// `core` must belong to this env.
    unsafe fn new_arraybuffer_copy(&self, core: Core, bytes: &[u8]) -> NapiResult<Owned> {
        // SAFETY: the engine copies `bytes` before returning
        unsafe {
            engine::checked(
                core.ctx,
                qjs::JS_NewArrayBufferCopy(core.ctx, bytes.as_ptr(), bytes.len() as _),
            )
        }
    }

    /// # Safety
    /// `core` must belong to this env; `data` must stay valid until the finalizer runs.
    unsafe fn new_external_store(
        &self,
        core: Core,
        data: *mut c_void,
        byte_length: usize,
        finalize: Option<Finalize>,
        hint: *mut c_void,
    ) -> NapiResult<Owned> {
        if data.is_null() {
            return Err(Status::InvalidArg);
        }
        let store = Box::into_raw(Box::new(ExternalStore {
            info: ExternalInfo::new(data, None, hint),
            queue: self.finalizers.clone(),
        }));
        // SAFETY: on failure the engine never took the store, so it is reclaimed here
        unsafe {
            let buffer = engine::checked(
                core.ctx,
                qjs::JS_NewArrayBuffer(
                    core.ctx,
                    data.cast(),
                    byte_length as _,
                    Some(free_external_store),
                    store.cast(),
                    false,
                ),
            )
            .inspect_err(|_| drop(Box::from_raw(store)))?;
            (*store).info.arm(finalize);
            Ok(buffer)
        }
    }

    /// Zero-filled `ArrayBuffer`; returns the handle and its data pointer
    pub fn create_arraybuffer(&self, byte_length: usize) -> NapiResult<(Value, *mut u8)> {
        let core = self.preamble()?;
        let zeros = vec![0u8; byte_length];
        // SAFETY: core belongs to self
        unsafe {
            let buffer = self.new_arraybuffer_copy(core, &zeros)?;
            let (data, _) = self.arraybuffer_bytes(core, buffer.raw());
            Ok((self.push(buffer)?, data))
        }
    }

    /// `ArrayBuffer` over caller-owned memory
    ///
    /// `finalize` runs once the engine releases the store, whether it was collected
    /// or detached.
    ///
    /// # Safety
    /// `data` must be valid for `byte_length` bytes until the finalizer runs.
    pub unsafe fn create_external_arraybuffer(
        &self,
        data: *mut c_void,
        byte_length: usize,
        finalize: Option<Finalize>,
        hint: *mut c_void,
    ) -> NapiResult<Value> {
        let core = self.preamble()?;
        // SAFETY: forwarded from the caller
        let buffer = unsafe { self.new_external_store(core, data, byte_length, finalize, hint)? };
        self.push(buffer)
    }

    pub fn get_arraybuffer_info(&self, value: Value) -> NapiResult<(*mut u8, usize)> {
        let (core, raw) = self.arraybuffer(value)?;
        // SAFETY: raw is a live ArrayBuffer
        Ok(unsafe { self.arraybuffer_bytes(core, raw) })
    }

    /// Whether `value` is an `ArrayBuffer` that is not tagged as a buffer
    pub fn is_arraybuffer(&self, value: Value) -> NapiResult<bool> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is live while its handle is
        unsafe { Ok(self.is_arraybuffer_raw(core, raw)? && !self.is_buffer_raw(core, raw)?) }
    }

    pub fn detach_arraybuffer(&self, value: Value) -> NapiResult<()> {
        let (core, raw) = self.arraybuffer(value)?;
        // SAFETY: raw is a live ArrayBuffer
        unsafe { qjs::JS_DetachArrayBuffer(core.ctx, raw) };
        Ok(())
    }

    pub fn is_detached_arraybuffer(&self, value: Value) -> NapiResult<bool> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is live while its handle is
        unsafe {
            if !self.is_arraybuffer_raw(core, raw)? {
                return Ok(false);
            }
            let mut len: qjs::size_t = 0;
            let data = qjs::JS_GetArrayBuffer(core.ctx, &mut len, raw);
            if data.is_null() {
                engine::discard_exception(core.ctx);
                return Ok(true);
            }
            Ok(false)
        }
    }

    /// # Safety
    /// `core` must belong to this env and `buffer` must be a live `ArrayBuffer`.
    unsafe fn tag_buffer(&self, core: Core, buffer: &Owned) -> NapiResult<()> {
        // SAFETY: forwarded from the caller
        unsafe { core.helpers.table_set(core.ctx, core.helpers.buffers, buffer.raw(), qjs::JS_TRUE) }
    }

    /// Zero-filled buffer; returns the handle and its data pointer
    pub fn create_buffer(&self, length: usize) -> NapiResult<(Value, *mut u8)> {
        self.create_buffer_copy(&vec![0u8; length])
    }

    pub fn create_buffer_copy(&self, bytes: &[u8]) -> NapiResult<(Value, *mut u8)> {
        let core = self.preamble()?;
        // SAFETY: core belongs to self
        unsafe {
            let buffer = self.new_arraybuffer_copy(core, bytes)?;
            self.tag_buffer(core, &buffer)?;
            let (data, _) = self.arraybuffer_bytes(core, buffer.raw());
            Ok((self.push(buffer)?, data))
        }
    }

    /// # Safety
    /// `data` must be valid for `length` bytes until the finalizer runs.
    pub unsafe fn create_external_buffer(
        &self,
        data: *mut c_void,
        length: usize,
        finalize: Option<Finalize>,
        hint: *mut c_void,
    ) -> NapiResult<Value> {
        let core = self.preamble()?;
        // SAFETY: forwarded from the caller
        unsafe {
            let buffer = self.new_external_store(core, data, length, finalize, hint)?;
            self.tag_buffer(core, &buffer)?;
            self.push(buffer)
        }
    }

    pub fn is_buffer(&self, value: Value) -> NapiResult<bool> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is live while its handle is
        unsafe { self.is_buffer_raw(core, raw) }
    }

    pub fn get_buffer_info(&self, value: Value) -> NapiResult<(*mut u8, usize)> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is live while its handle is
        unsafe {
            if !self.is_buffer_raw(core, raw)? {
                return Err(Status::InvalidArg);
            }
            Ok(self.arraybuffer_bytes(core, raw))
        }
    }

    /// Typed array view over `arraybuffer`
    ///
    /// A misaligned offset or a view running past the end of the buffer throws a
    /// `RangeError` and yields `PendingException`.
    pub fn create_typedarray(
        &self,
        kind: TypedArrayType,
        length: usize,
        arraybuffer: Value,
        byte_offset: usize,
    ) -> NapiResult<Value> {
        let core = self.preamble()?;
        let raw = self.raw(arraybuffer)?;
        // SAFETY: raw is live while its handle is
        unsafe {
            if !self.is_arraybuffer_raw(core, raw)? {
                return Err(Status::InvalidArg);
            }
            let size = kind.element_size();
            if byte_offset % size != 0 {
                let message = format!(
                    "start offset of {} should be a multiple of {}",
                    kind.name(),
                    size
                );
                return Err(self.throw_new(
                    core,
                    ErrorKind::RangeError,
                    &message,
                    Some("ERR_NAPI_INVALID_TYPEDARRAY_ALIGNMENT"),
                ));
            }
            let (_, byte_length) = self.arraybuffer_bytes(core, raw);
            let end = length
                .checked_mul(size)
                .and_then(|bytes| bytes.checked_add(byte_offset));
            if end.is_none_or(|end| end > byte_length) {
                return Err(self.throw_new(
                    core,
                    ErrorKind::RangeError,
                    "Invalid typed array length",
                    Some("ERR_NAPI_INVALID_TYPEDARRAY_LENGTH"),
                ));
            }

            let kind = engine::new_int32(kind as i32);
            let offset = engine::new_int64(byte_offset as i64);
            let length = engine::new_int64(length as i64);
            self.call_helper(core, core.helpers.make_typedarray, &[kind, raw, offset, length])
        }
    }

    pub fn is_typedarray(&self, value: Value) -> NapiResult<bool> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        if !engine::is_object(raw) {
            return Ok(false);
        }
        // SAFETY: raw is live while its handle is
        unsafe { self.predicate(core, core.helpers.is_typedarray, &[raw]) }
    }

    /// # Safety
    /// `array` must be a live array of `core.ctx`.
    unsafe fn usize_at(&self, core: Core, array: JSValue, index: u32) -> NapiResult<usize> {
        // SAFETY: forwarded from the caller
        unsafe {
            let element = engine::array_get(core.ctx, array, index)?;
            Ok(engine::to_f64(core.ctx, element.raw())? as usize)
        }
    }

    pub fn get_typedarray_info(&self, value: Value) -> NapiResult<TypedArrayInfo> {
        if !self.is_typedarray(value)? {
            return Err(Status::InvalidArg);
        }
        let core = self.core()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is a live typed array
        unsafe {
            let info = engine::call(core.ctx, core.helpers.typedarray_info, qjs::JS_UNDEFINED, &[raw])?;
            let kind = self.usize_at(core, info.raw(), 0)?;
            let kind = i32::try_from(kind)
                .ok()
                .and_then(TypedArrayType::from_raw)
                .ok_or(Status::InvalidArg)?;
            let length = self.usize_at(core, info.raw(), 1)?;
            let buffer = engine::array_get(core.ctx, info.raw(), 2)?;
            let byte_offset = self.usize_at(core, info.raw(), 3)?;

            let (base, _) = self.arraybuffer_bytes(core, buffer.raw());
            let data = if base.is_null() { base } else { base.add(byte_offset) };
            Ok(TypedArrayInfo {
                kind,
                length,
                data,
                arraybuffer: self.push(buffer)?,
                byte_offset,
            })
        }
    }

    /// `DataView` over `arraybuffer`; out-of-range views throw a `RangeError`
    pub fn create_dataview(
        &self,
        byte_length: usize,
        arraybuffer: Value,
        byte_offset: usize,
    ) -> NapiResult<Value> {
        let core = self.preamble()?;
        let raw = self.raw(arraybuffer)?;
        // SAFETY: raw is live while its handle is
        unsafe {
            if !self.is_arraybuffer_raw(core, raw)? {
                return Err(Status::InvalidArg);
            }
            let (_, available) = self.arraybuffer_bytes(core, raw);
            if byte_length
                .checked_add(byte_offset)
                .is_none_or(|end| end > available)
            {
                return Err(self.throw_new(
                    core,
                    ErrorKind::RangeError,
                    "byte_offset + byte_length should be less than or equal to the size in bytes of the array passed in",
                    Some("ERR_NAPI_INVALID_DATAVIEW_ARGS"),
                ));
            }
            let offset = engine::new_int64(byte_offset as i64);
            let length = engine::new_int64(byte_length as i64);
            self.call_helper(core, core.helpers.make_dataview, &[raw, offset, length])
        }
    }

    pub fn is_dataview(&self, value: Value) -> NapiResult<bool> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        if !engine::is_object(raw) {
            return Ok(false);
        }
        // SAFETY: raw is live while its handle is
        unsafe { self.predicate(core, core.helpers.is_dataview, &[raw]) }
    }

    pub fn get_dataview_info(&self, value: Value) -> NapiResult<DataViewInfo> {
        if !self.is_dataview(value)? {
            return Err(Status::InvalidArg);
        }
        let core = self.core()?;
        let raw = self.raw(value)?;
        // SAFETY: raw is a live DataView
        unsafe {
            let info = engine::call(core.ctx, core.helpers.dataview_info, qjs::JS_UNDEFINED, &[raw])?;
            let byte_length = self.usize_at(core, info.raw(), 0)?;
            let buffer = engine::array_get(core.ctx, info.raw(), 1)?;
            let byte_offset = self.usize_at(core, info.raw(), 2)?;

            let (base, _) = self.arraybuffer_bytes(core, buffer.raw());
            let data = if base.is_null() { base } else { base.add(byte_offset) };
            Ok(DataViewInfo {
                byte_length,
                data,
                arraybuffer: self.push(buffer)?,
                byte_offset,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;
    use std::cell::Cell;

    #[test]
    fn test_arraybuffer_is_zeroed_and_writable() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let (buffer, data) = env.create_arraybuffer(8).unwrap();
            let bytes = unsafe { std::slice::from_raw_parts_mut(data, 8) };
            assert!(bytes.iter().all(|b| *b == 0));
            bytes[3] = 9;

            let (info_data, len) = env.get_arraybuffer_info(buffer).unwrap();
            assert_eq!(info_data, data);
            assert_eq!(len, 8);
            assert!(env.is_arraybuffer(buffer).unwrap());
            assert!(!env.is_buffer(buffer).unwrap());
        });
    }

    #[test]
    fn test_buffer_is_tagged() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let (buffer, _) = env.create_buffer_copy(b"otter").unwrap();
            assert!(env.is_buffer(buffer).unwrap());
            assert!(!env.is_arraybuffer(buffer).unwrap());
            let (data, len) = env.get_buffer_info(buffer).unwrap();
            assert_eq!(unsafe { std::slice::from_raw_parts(data, len) }, b"otter");

            let (plain, _) = env.create_arraybuffer(1).unwrap();
            assert_eq!(env.get_buffer_info(plain), Err(Status::InvalidArg));
        });
    }

    #[test]
    fn test_typedarray_bounds_raise_range_error() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let (buffer, _) = env.create_arraybuffer(16).unwrap();
            assert_eq!(
                env.create_typedarray(TypedArrayType::Int32, 4, buffer, 4),
                Err(Status::PendingException)
            );
            let error = env.get_and_clear_last_exception().unwrap();
            let name = env.get_named_property(error, "name").unwrap();
            assert_eq!(env.get_value_string_utf8(name).unwrap(), "RangeError");

            assert_eq!(
                env.create_typedarray(TypedArrayType::Float64, 1, buffer, 4),
                Err(Status::PendingException)
            );
            env.get_and_clear_last_exception().unwrap();

            let view = env.create_typedarray(TypedArrayType::Int32, 3, buffer, 4).unwrap();
            assert!(env.is_typedarray(view).unwrap());
            let info = env.get_typedarray_info(view).unwrap();
            assert_eq!(info.kind, TypedArrayType::Int32);
            assert_eq!(info.length, 3);
            assert_eq!(info.byte_offset, 4);
            assert!(env.strict_equals(info.arraybuffer, buffer).unwrap());
        });
    }

    #[test]
    fn test_dataview_bounds() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let (buffer, data) = env.create_arraybuffer(8).unwrap();
            assert_eq!(env.create_dataview(8, buffer, 1), Err(Status::PendingException));
            env.get_and_clear_last_exception().unwrap();

            let view = env.create_dataview(4, buffer, 2).unwrap();
            assert!(env.is_dataview(view).unwrap());
            assert!(!env.is_typedarray(view).unwrap());
            let info = env.get_dataview_info(view).unwrap();
            assert_eq!(info.byte_length, 4);
            assert_eq!(info.byte_offset, 2);
            assert_eq!(info.data, unsafe { data.add(2) });
        });
    }

    #[test]
    fn test_detach() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let (buffer, _) = env.create_arraybuffer(4).unwrap();
            assert!(!env.is_detached_arraybuffer(buffer).unwrap());
            env.detach_arraybuffer(buffer).unwrap();
            assert!(env.is_detached_arraybuffer(buffer).unwrap());
            assert!(!env.is_exception_pending().unwrap());

            let object = env.create_object().unwrap();
            assert_eq!(env.detach_arraybuffer(object), Err(Status::ArraybufferExpected));
        });
    }

    #[test]
    fn test_external_arraybuffer_finalized_once() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let mut backing = vec![1u8, 2, 3, 4];
        let data = backing.as_mut_ptr() as *mut c_void;

        env.scope(|env| {
            let buffer = unsafe {
                env.create_external_arraybuffer(
                    data,
                    4,
                    Some(Box::new(move |_env, data, _hint| {
                        assert!(!data.is_null());
                        seen.set(seen.get() + 1);
                    })),
                    ptr::null_mut(),
                )
            }
            .unwrap();
            let (info, len) = env.get_arraybuffer_info(buffer).unwrap();
            assert_eq!(info as *mut c_void, data);
            assert_eq!(len, 4);
            env.detach_arraybuffer(buffer).unwrap();
        });
        env.run_gc().unwrap();
        assert_eq!(calls.get(), 1);
        drop(backing);
    }

    #[test]
    fn test_typedarray_kind_numbering() {
        assert_eq!(TypedArrayType::from_raw(0), Some(TypedArrayType::Int8));
        assert_eq!(TypedArrayType::from_raw(10), Some(TypedArrayType::BigUint64));
        assert_eq!(TypedArrayType::from_raw(11), None);
        assert_eq!(TypedArrayType::BigInt64.element_size(), 8);
    }
}
