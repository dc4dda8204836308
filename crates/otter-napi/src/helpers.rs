//! Script-side helpers installed once per environment
//!
//! The engine exposes no C entry points for a handful of operations (bigint digits,
//! typed array construction by kind, key enumeration with filters...). Those are
//! implemented as small functions evaluated at environment creation and called
//! through the evaluator afterwards.
//!
//! Per-object native state (wraps, type tags, buffer marks) lives in weak side
//! tables held here rather than in properties of the object, so script can
//! neither observe nor remove it and a Proxy keeps state apart from its target.

use std::ffi::c_char;

use crate::engine::{self, JSContext, JSValue, Owned, checked, qjs};
use crate::error::NapiResult;

pub(crate) const HELPER_SOURCE: &str = r#"(() => {
  'use strict';
  const getProto = Object.getPrototypeOf;
  const uncurry = (f) => Function.prototype.call.bind(f);
  const mapGet = uncurry(WeakMap.prototype.get);
  const mapSet = uncurry(WeakMap.prototype.set);
  const mapDelete = uncurry(WeakMap.prototype.delete);
  const deref = uncurry(WeakRef.prototype.deref);
  const SideTable = WeakMap;
  const Weak = WeakRef;
  const typedArrays = [
    Int8Array, Uint8Array, Uint8ClampedArray, Int16Array, Uint16Array, Int32Array,
    Uint32Array, Float32Array, Float64Array, BigInt64Array, BigUint64Array,
  ];
  const errors = [Error, TypeError, RangeError, SyntaxError];
  const isIndex = (key) => String(key >>> 0) === key && key !== '4294967295';
  return {
    objectPrototype: Object.prototype,
    wraps: new SideTable(),
    typeTags: new SideTable(),
    buffers: new SideTable(),
    finalizers: new SideTable(),
    sideGet: (table, key) => mapGet(table, key),
    sideSet: (table, key, value) => {
      mapSet(table, key, value);
    },
    sideDelete: (table, key) => mapDelete(table, key),
    sideAppend: (table, key, value) => {
      const list = mapGet(table, key);
      if (list === undefined) mapSet(table, key, [value]);
      else list[list.length] = value;
    },
    makeWeakRef: (target) => new Weak(target),
    derefWeak: (ref) => deref(ref),
    typeOf: (v) => typeof v,
    strictEquals: (a, b) => a === b,
    isArray: (v) => Array.isArray(v),
    isDate: (v) => v instanceof Date,
    isPromise: (v) => v instanceof Promise,
    isError: (v) => v instanceof Error,
    isArrayBuffer: (v) => v instanceof ArrayBuffer,
    isDataView: (v) => v instanceof DataView,
    isTypedArray: (v) => ArrayBuffer.isView(v) && !(v instanceof DataView),
    getPrototypeOf: (v) => getProto(v),
    toObject: (v) => {
      if (v == null) throw new TypeError('Cannot convert undefined or null to object');
      return Object(v);
    },
    freeze: (v) => Object.freeze(v),
    seal: (v) => Object.seal(v),
    makeSymbol: (d) => (d === undefined ? Symbol() : Symbol(d)),
    symbolFor: (key) => Symbol.for(key),
    makeDate: (t) => new Date(t),
    dateValue: (d) => Date.prototype.valueOf.call(d),
    makeError: (kind, message, code) => {
      const error = new errors[kind](message);
      if (code !== undefined) error.code = code;
      return error;
    },
    makeTypedArray: (kind, buffer, offset, length) =>
      new typedArrays[kind](buffer, offset, length),
    makeDataView: (buffer, offset, length) => new DataView(buffer, offset, length),
    typedArrayInfo: (v) => [
      typedArrays.findIndex((C) => v instanceof C), v.length, v.buffer, v.byteOffset,
    ],
    dataViewInfo: (v) => [v.byteLength, v.buffer, v.byteOffset],
    bigintFromWords: (negative, halves) => {
      let r = 0n;
      for (let i = halves.length - 2; i >= 0; i -= 2) {
        r = (r << 64n) | (BigInt(halves[i + 1]) << 32n) | BigInt(halves[i]);
      }
      return negative ? -r : r;
    },
    bigintToWords: (big) => {
      const negative = big < 0n;
      let v = negative ? -big : big;
      const halves = [];
      while (v > 0n) {
        halves.push(Number(v & 0xffffffffn), Number((v >> 32n) & 0xffffffffn));
        v >>= 64n;
      }
      return [negative, halves];
    },
    propertyNames: (obj, ownOnly, filter, numbersToStrings) => {
      const keys = [];
      const seen = new Set();
      for (let o = obj; o !== null; o = ownOnly ? null : getProto(o)) {
        for (const key of Reflect.ownKeys(o)) {
          if (seen.has(key)) continue;
          seen.add(key);
          const symbol = typeof key === 'symbol';
          if (symbol ? filter & 16 : filter & 8) continue;
          const desc = Reflect.getOwnPropertyDescriptor(o, key);
          if (filter & 1 && !desc.writable) continue;
          if (filter & 2 && !desc.enumerable) continue;
          if (filter & 4 && !desc.configurable) continue;
          keys.push(!symbol && !numbersToStrings && isIndex(key) ? Number(key) : key);
        }
      }
      return keys;
    },
  };
})()"#;

macro_rules! helper_table {
    ($($field:ident => $name:literal,)*) => {
        /// Engine values pulled out of the helper table
        ///
        /// Each field owns one reference, released in [`Helpers::release`].
        #[derive(Clone, Copy)]
        pub(crate) struct Helpers {
            $(pub(crate) $field: JSValue,)*
        }

        impl Helpers {
            /// # Safety
            /// `ctx` must be live and `table` must be the object built by
            /// [`HELPER_SOURCE`].
            pub(crate) unsafe fn load(ctx: *mut JSContext, table: JSValue) -> NapiResult<Self> {
                // SAFETY: property reads on an object this crate created
                unsafe {
                    $(
                        let $field: Owned = checked(
                            ctx,
                            qjs::JS_GetPropertyStr(
                                ctx,
                                table,
                                concat!($name, "\0").as_ptr() as *const c_char,
                            ),
                        )?;
                    )*
                    Ok(Self { $($field: $field.into_raw(),)* })
                }
            }

            /// # Safety
            /// `ctx` must be the context the helpers were loaded from.
            pub(crate) unsafe fn release(self, ctx: *mut JSContext) {
                // SAFETY: each field owns exactly one reference
                unsafe { $(qjs::JS_FreeValue(ctx, self.$field);)* }
            }
        }
    };
}

helper_table! {
    object_prototype => "objectPrototype",
    wraps => "wraps",
    type_tags => "typeTags",
    buffers => "buffers",
    finalizers => "finalizers",
    side_get => "sideGet",
    side_set => "sideSet",
    side_delete => "sideDelete",
    side_append => "sideAppend",
    make_weak_ref => "makeWeakRef",
    deref_weak => "derefWeak",
    type_of => "typeOf",
    strict_equals => "strictEquals",
    is_array => "isArray",
    is_date => "isDate",
    is_promise => "isPromise",
    is_error => "isError",
    is_arraybuffer => "isArrayBuffer",
    is_dataview => "isDataView",
    is_typedarray => "isTypedArray",
    get_prototype_of => "getPrototypeOf",
    to_object => "toObject",
    freeze => "freeze",
    seal => "seal",
    make_symbol => "makeSymbol",
    symbol_for => "symbolFor",
    make_date => "makeDate",
    date_value => "dateValue",
    make_error => "makeError",
    make_typedarray => "makeTypedArray",
    make_dataview => "makeDataView",
    typedarray_info => "typedArrayInfo",
    dataview_info => "dataViewInfo",
    bigint_from_words => "bigintFromWords",
    bigint_to_words => "bigintToWords",
    property_names => "propertyNames",
}

impl Helpers {
    /// Entry for `key` in a side table, `None` when absent
    ///
    /// # Safety
    /// `ctx` must be the helpers' context and `key` an object of it.
    pub(crate) unsafe fn table_get(
        &self,
        ctx: *mut JSContext,
        table: JSValue,
        key: JSValue,
    ) -> NapiResult<Option<Owned>> {
        // SAFETY: forwarded from the caller
        let entry = unsafe { engine::call(ctx, self.side_get, qjs::JS_UNDEFINED, &[table, key])? };
        Ok((!engine::is_undefined(entry.raw())).then_some(entry))
    }

    /// # Safety
    /// Same contract as [`Helpers::table_get`]; `value` must belong to `ctx`.
    pub(crate) unsafe fn table_set(
        &self,
        ctx: *mut JSContext,
        table: JSValue,
        key: JSValue,
        value: JSValue,
    ) -> NapiResult<()> {
        // SAFETY: forwarded from the caller
        unsafe { engine::call(ctx, self.side_set, qjs::JS_UNDEFINED, &[table, key, value])? };
        Ok(())
    }

    /// Push `value` onto the list kept for `key`
    ///
    /// # Safety
    /// Same contract as [`Helpers::table_set`].
    pub(crate) unsafe fn table_append(
        &self,
        ctx: *mut JSContext,
        table: JSValue,
        key: JSValue,
        value: JSValue,
    ) -> NapiResult<()> {
        // SAFETY: forwarded from the caller
        unsafe { engine::call(ctx, self.side_append, qjs::JS_UNDEFINED, &[table, key, value])? };
        Ok(())
    }

    /// # Safety
    /// Same contract as [`Helpers::table_get`].
    pub(crate) unsafe fn table_delete(
        &self,
        ctx: *mut JSContext,
        table: JSValue,
        key: JSValue,
    ) -> NapiResult<()> {
        // SAFETY: forwarded from the caller
        unsafe { engine::call(ctx, self.side_delete, qjs::JS_UNDEFINED, &[table, key])? };
        Ok(())
    }
}
