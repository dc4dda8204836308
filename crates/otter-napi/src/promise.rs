//! Promises and their deferred resolvers

use crate::engine::{self, JSRuntime, JSValue, Owned, qjs};
use crate::env::Env;
use crate::error::{NapiResult, Status};
use crate::scope::Value;

/// Pending resolution of a promise created by [`Env::create_promise`]
///
/// Consumed by exactly one of [`Env::resolve_deferred`] or [`Env::reject_deferred`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Deferred(usize);

impl Deferred {
    /// Consume the deferred into non-zero bits for the C ABI
    pub fn into_bits(self) -> usize {
        self.0 + 1
    }

    /// # Safety
    /// `bits` must come from [`Deferred::into_bits`] and be used once.
    pub unsafe fn from_bits(bits: usize) -> Option<Self> {
        bits.checked_sub(1).map(Self)
    }
}

/// Resolving functions owned by the env's deferred table
pub(crate) struct DeferredSlot {
    resolve: JSValue,
    reject: JSValue,
}

impl DeferredSlot {
    pub(crate) fn release(self, rt: *mut JSRuntime) {
        // SAFETY: the slot owns one reference to each function
        unsafe {
            qjs::JS_FreeValueRT(rt, self.resolve);
            qjs::JS_FreeValueRT(rt, self.reject);
        }
    }
}

impl Env {
    pub fn create_promise(&self) -> NapiResult<(Deferred, Value)> {
        let core = self.preamble()?;
        let mut funcs = [qjs::JS_UNDEFINED; 2];
        // SAFETY: the engine fills both resolving functions on success
        let promise = unsafe {
            engine::checked(core.ctx, qjs::JS_NewPromiseCapability(core.ctx, funcs.as_mut_ptr()))?
        };
        let key = self.deferreds.borrow_mut().insert(DeferredSlot {
            resolve: funcs[0],
            reject: funcs[1],
        });
        match self.push(promise) {
            Ok(value) => Ok((Deferred(key), value)),
            Err(status) => {
                self.deferreds.borrow_mut().remove(key).release(self.runtime.rt);
                Err(status)
            }
        }
    }

    pub fn resolve_deferred(&self, deferred: Deferred, resolution: Value) -> NapiResult<()> {
        self.settle(deferred, resolution, false)
    }

    pub fn reject_deferred(&self, deferred: Deferred, rejection: Value) -> NapiResult<()> {
        self.settle(deferred, rejection, true)
    }

    fn settle(&self, deferred: Deferred, value: Value, reject: bool) -> NapiResult<()> {
        let core = self.preamble()?;
        let raw = self.raw(value)?;
        let slot = self
            .deferreds
            .borrow_mut()
            .try_remove(deferred.0)
            .ok_or(Status::InvalidArg)?;
        let func = if reject { slot.reject } else { slot.resolve };
        // SAFETY: the slot keeps both functions alive until released below
        let result = unsafe { engine::call(core.ctx, func, qjs::JS_UNDEFINED, &[raw]) };
        slot.release(self.runtime.rt);
        result.map(drop::<Owned>)
    }

    pub fn is_promise(&self, value: Value) -> NapiResult<bool> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        if !engine::is_object(raw) {
            return Ok(false);
        }
        // SAFETY: raw is live while its handle is
        unsafe { self.predicate(core, core.helpers.is_promise, &[raw]) }
    }

    /// Deferreds created but not yet settled
    pub fn pending_deferreds(&self) -> usize {
        self.deferreds.borrow().len()
    }
}
