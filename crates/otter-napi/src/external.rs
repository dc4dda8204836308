//! Native payloads attached to engine objects
//!
//! Externals, wraps and `add_finalizer` registrations all carry an [`ExternalInfo`]
//! inside an object of the runtime's external class. Wrap and finalizer carriers
//! are held by weak side tables keyed on the target object, so they are released
//! by the collector together with it. The engine-side class finalizer never runs
//! user code: it moves the armed info onto the environment's [`FinalizerQueue`],
//! which is drained at safe points outside the collector.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;

use tracing::warn;

use crate::engine::{self, JSRuntime, JSValue, Owned, qjs};
use crate::env::{Core, Env};
use crate::error::{NapiResult, Status};
use crate::reference::Reference;
use crate::runtime::RuntimeInner;
use crate::scope::Value;

/// User finalizer: receives the environment, the native data and the hint
pub type Finalize = Box<dyn FnOnce(&Env, *mut c_void, *mut c_void)>;

/// 128-bit tag attached with [`Env::type_tag_object`]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeTag {
    pub lower: u64,
    pub upper: u64,
}

/// Native data, its finalizer and the finalize hint
///
/// The finalizer is taken out before it runs, so it can fire at most once.
pub(crate) struct ExternalInfo {
    pub(crate) data: *mut c_void,
    pub(crate) hint: *mut c_void,
    finalize: Option<Finalize>,
}

impl ExternalInfo {
    pub(crate) fn new(data: *mut c_void, finalize: Option<Finalize>, hint: *mut c_void) -> Self {
        Self {
            data,
            hint,
            finalize,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.finalize.is_some()
    }

    pub(crate) fn arm(&mut self, finalize: Option<Finalize>) {
        self.finalize = finalize;
    }

    pub(crate) fn disarm(&mut self) {
        self.finalize = None;
    }

    /// Move the finalizer into a new record, leaving this one disarmed
    pub(crate) fn take(&mut self) -> Option<ExternalInfo> {
        let finalize = self.finalize.take()?;
        Some(ExternalInfo::new(self.data, Some(finalize), self.hint))
    }

    pub(crate) fn finalize(&mut self, env: &Env) {
        if let Some(finalize) = self.finalize.take() {
            finalize(env, self.data, self.hint);
        }
    }
}

impl Drop for ExternalInfo {
    fn drop(&mut self) {
        if self.finalize.is_some() {
            warn!(data = ?self.data, "finalizer dropped without running");
        }
    }
}

/// Finalizers waiting for a safe point
#[derive(Default)]
pub(crate) struct FinalizerQueue {
    pending: RefCell<VecDeque<ExternalInfo>>,
}

impl FinalizerQueue {
    pub(crate) fn push(&self, info: ExternalInfo) {
        self.pending.borrow_mut().push_back(info);
    }

    pub(crate) fn pop(&self) -> Option<ExternalInfo> {
        self.pending.borrow_mut().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.borrow().len()
    }
}

/// Opaque payload of an external-class object
pub(crate) struct Carrier {
    pub(crate) info: ExternalInfo,
    queue: Rc<FinalizerQueue>,
}

/// Class finalizer of the external class
pub(crate) unsafe extern "C" fn external_finalizer(rt: *mut JSRuntime, value: JSValue) {
    // SAFETY: the runtime opaque is set before any carrier is created
    let Some(inner) = (unsafe { RuntimeInner::from_engine(rt) }) else {
        return;
    };
    // SAFETY: carriers of this class always hold a boxed Carrier or null
    let carrier = unsafe { engine::opaque::<Carrier>(value, inner.classes.external) };
    if carrier.is_null() {
        return;
    }
    // SAFETY: the collector calls this exactly once per object
    let mut carrier = unsafe { Box::from_raw(carrier) };
    if let Some(armed) = carrier.info.take() {
        carrier.queue.push(armed);
    }
}

/// Allocate an external-class carrier with no finalizer armed yet
///
/// Callers arm the finalizer once the carrier is owned by its final holder, so a
/// failure part way never runs user code.
///
/// # Safety
/// `core` must belong to `env`.
unsafe fn new_external(
    env: &Env,
    core: Core,
    data: *mut c_void,
    hint: *mut c_void,
) -> NapiResult<Owned> {
    let carrier = Box::into_raw(Box::new(Carrier {
        info: ExternalInfo::new(data, None, hint),
        queue: env.finalizers.clone(),
    }));
    // SAFETY: on failure the box was never attached and is reclaimed here
    unsafe {
        engine::new_carrier(core.ctx, env.runtime.classes.external, carrier.cast()).inspect_err(
            |_| drop(Box::from_raw(carrier)),
        )
    }
}

impl Env {
    /// Create an object that carries `data` and finalizes it when collected
    pub fn create_external(
        &self,
        data: *mut c_void,
        finalize: Option<Finalize>,
        hint: *mut c_void,
    ) -> NapiResult<Value> {
        let core = self.core()?;
        // SAFETY: core belongs to self
        let object = unsafe { new_external(self, core, data, hint)? };
        let payload = object.raw();
        let handle = self.push(object)?;
        // SAFETY: the new handle keeps the carrier alive
        if let Some(carrier) = unsafe { self.external_payload(payload) } {
            carrier.info.arm(finalize);
        }
        Ok(handle)
    }

    pub fn get_value_external(&self, value: Value) -> NapiResult<*mut c_void> {
        let raw = self.raw(value)?;
        // SAFETY: the payload is read while the handle keeps the object alive
        match unsafe { self.external_payload(raw) } {
            Some(carrier) => Ok(carrier.info.data),
            None => Err(Status::InvalidArg),
        }
    }

    /// # Safety
    /// `raw` must be kept alive for as long as the returned borrow is used.
    pub(crate) unsafe fn external_payload<'a>(&self, raw: JSValue) -> Option<&'a mut Carrier> {
        // SAFETY: external-class payloads are always boxed carriers
        unsafe { engine::opaque::<Carrier>(raw, self.runtime.classes.external).as_mut() }
    }

    /// Object argument of the wrap and type-tag operations
    fn target(&self, object: Value) -> NapiResult<(Core, JSValue)> {
        let core = self.preamble()?;
        let raw = self.raw(object)?;
        if !engine::is_object(raw) {
            return Err(Status::ObjectExpected);
        }
        Ok((core, raw))
    }

    /// Wrap carrier of `object`, if it is wrapped
    fn wrap_carrier(&self, core: Core, object: JSValue) -> NapiResult<Option<Owned>> {
        // SAFETY: object is live while its handle is
        unsafe { core.helpers.table_get(core.ctx, core.helpers.wraps, object) }
    }

    /// Associate native data with a script object
    ///
    /// The finalizer runs once the object is collected, unless the wrap is removed
    /// first. With `want_reference` a weak [`Reference`] to the object is returned.
    /// A Proxy is wrapped on its own, independently of its target.
    pub fn wrap(
        &self,
        object: Value,
        data: *mut c_void,
        finalize: Option<Finalize>,
        hint: *mut c_void,
        want_reference: bool,
    ) -> NapiResult<Option<Reference>> {
        let (core, raw) = self.target(object)?;
        if self.wrap_carrier(core, raw)?.is_some() {
            return Err(Status::InvalidArg);
        }
        // SAFETY: core belongs to self; the finalizer is armed only once the
        // table owns the carrier
        unsafe {
            let carrier = new_external(self, core, data, hint)?;
            core.helpers.table_set(core.ctx, core.helpers.wraps, raw, carrier.raw())?;
            if let Some(carrier) = self.external_payload(carrier.raw()) {
                carrier.info.arm(finalize);
            }
        }

        if want_reference {
            self.create_reference(object, 0).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Native data of a wrapped object
    pub fn unwrap(&self, object: Value) -> NapiResult<*mut c_void> {
        let (core, raw) = self.target(object)?;
        let carrier = self.wrap_carrier(core, raw)?.ok_or(Status::InvalidArg)?;
        // SAFETY: `carrier` keeps the payload alive
        match unsafe { self.external_payload(carrier.raw()) } {
            Some(carrier) => Ok(carrier.info.data),
            None => Err(Status::InvalidArg),
        }
    }

    /// Detach a wrap without running its finalizer and return the native data
    pub fn remove_wrap(&self, object: Value) -> NapiResult<*mut c_void> {
        let (core, raw) = self.target(object)?;
        let carrier = self.wrap_carrier(core, raw)?.ok_or(Status::InvalidArg)?;
        // SAFETY: `carrier` is owned here
        let payload =
            unsafe { engine::opaque::<Carrier>(carrier.raw(), self.runtime.classes.external) };
        if payload.is_null() {
            return Err(Status::InvalidArg);
        }
        // SAFETY: object is live while its handle is
        unsafe { core.helpers.table_delete(core.ctx, core.helpers.wraps, raw)? };

        // SAFETY: detaching the payload first keeps the class finalizer from seeing it
        let mut payload = unsafe {
            qjs::JS_SetOpaque(carrier.raw(), ptr::null_mut());
            Box::from_raw(payload)
        };
        payload.info.disarm();
        Ok(payload.info.data)
    }

    /// Run `finalize` once `object` is collected, without claiming the wrap slot
    pub fn add_finalizer(
        &self,
        object: Value,
        data: *mut c_void,
        finalize: Finalize,
        hint: *mut c_void,
        want_reference: bool,
    ) -> NapiResult<Option<Reference>> {
        let core = self.core()?;
        let raw = self.raw(object)?;
        if !engine::is_object(raw) {
            return Err(Status::ObjectExpected);
        }

        // SAFETY: core belongs to self; the carrier is armed once the table holds it
        unsafe {
            let carrier = new_external(self, core, data, hint)?;
            core.helpers.table_append(core.ctx, core.helpers.finalizers, raw, carrier.raw())?;
            if let Some(carrier) = self.external_payload(carrier.raw()) {
                carrier.info.arm(Some(finalize));
            }
        }

        if want_reference {
            self.create_reference(object, 0).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Attach a 128-bit type tag; an object can be tagged once
    pub fn type_tag_object(&self, object: Value, tag: &TypeTag) -> NapiResult<()> {
        let (core, raw) = self.target(object)?;
        // SAFETY: raw is live while its handle is
        unsafe {
            if core.helpers.table_get(core.ctx, core.helpers.type_tags, raw)?.is_some() {
                return Err(Status::InvalidArg);
            }
            let value = self.bigint_from_words_raw(core, false, &[tag.lower, tag.upper])?;
            core.helpers.table_set(core.ctx, core.helpers.type_tags, raw, value.raw())
        }
    }

    pub fn check_object_type_tag(&self, object: Value, tag: &TypeTag) -> NapiResult<bool> {
        let (core, raw) = self.target(object)?;
        // SAFETY: raw is live while its handle is
        let Some(stored) = (unsafe { core.helpers.table_get(core.ctx, core.helpers.type_tags, raw)? })
        else {
            return Ok(false);
        };
        // SAFETY: `stored` is owned for the duration of the read
        let (negative, words) = unsafe { self.bigint_words_raw(core, stored.raw(), 2)? };
        let word = |i: usize| words.get(i).copied().unwrap_or(0);
        Ok(!negative && words.len() <= 2 && word(0) == tag.lower && word(1) == tag.upper)
    }

    /// Number of finalizers waiting for the next safe point
    pub fn pending_finalizers(&self) -> usize {
        self.finalizers.len()
    }
}
