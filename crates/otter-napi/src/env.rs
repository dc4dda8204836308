//! Execution environment: one engine context plus the binding-layer state bound to it

use std::cell::{Cell, RefCell};
use std::ffi::{c_int, c_void};
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ops::Deref;
use std::ptr;
use std::rc::Rc;

use slab::Slab;
use tracing::{debug, trace};

use crate::config::RuntimeConfig;
use crate::engine::{self, JSContext, JSValue, Owned, Pending, qjs};
use crate::error::{ExtendedErrorInfo, NapiResult, Status};
use crate::external::{ExternalInfo, Finalize, FinalizerQueue};
use crate::helpers::{HELPER_SOURCE, Helpers};
use crate::promise::DeferredSlot;
use crate::reference::RefSlot;
use crate::runtime::RuntimeInner;
use crate::scope::HandleStore;

/// Node-API version implemented by this layer
pub const NAPI_VERSION: u32 = 8;

/// Engine objects owned by a live environment
///
/// Copied out of the env on every call; emptied exactly once at teardown.
#[derive(Clone, Copy)]
pub(crate) struct Core {
    pub ctx: *mut JSContext,
    pub global: JSValue,
    pub helpers: Helpers,
}

impl Core {
    /// # Safety
    /// `ctx` must be a fresh context of `runtime`.
    unsafe fn init(ctx: *mut JSContext, config: &RuntimeConfig) -> NapiResult<Self> {
        // SAFETY: ctx is live; every intermediate is owned until the end
        unsafe {
            let global = Owned::new(ctx, qjs::JS_GetGlobalObject(ctx));
            let table = engine::eval(ctx, HELPER_SOURCE, "<napi:helpers>")?;
            let helpers = Helpers::load(ctx, table.raw())?;
            let helpers = HelperGuard { ctx, helpers };

            if config.install_gc_global {
                let gc = engine::checked(
                    ctx,
                    qjs::JS_NewCFunctionData(ctx, Some(gc_native), 0, 0, 0, ptr::null_mut()),
                )?;
                if qjs::JS_SetPropertyStr(ctx, global.raw(), c"gc".as_ptr(), gc.into_raw()) < 0 {
                    return Err(Status::PendingException);
                }
            }

            Ok(Self {
                ctx,
                global: global.into_raw(),
                helpers: helpers.into_inner(),
            })
        }
    }

    /// # Safety
    /// Must be called once, after which no copy of this core is used.
    unsafe fn release(self) {
        // SAFETY: every field owns one reference taken in init
        unsafe {
            let ctx = self.ctx;
            self.helpers.release(ctx);
            qjs::JS_FreeValue(ctx, self.global);
        }
    }
}

/// Releases loaded helpers if environment setup fails part way
struct HelperGuard {
    ctx: *mut JSContext,
    helpers: Helpers,
}

impl HelperGuard {
    fn into_inner(self) -> Helpers {
        let helpers = self.helpers;
        mem::forget(self);
        helpers
    }
}

impl Drop for HelperGuard {
    fn drop(&mut self) {
        // SAFETY: the guard still owns the helper references
        unsafe { self.helpers.release(self.ctx) };
    }
}

impl Deref for HelperGuard {
    type Target = Helpers;

    fn deref(&self) -> &Helpers {
        &self.helpers
    }
}

/// One script execution context and its binding-layer state
///
/// Obtained through [`Environment`], which owns it. Native callbacks and finalizers
/// receive `&Env`.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync`. An environment must only be used from the
/// thread that created its runtime.
pub struct Env {
    pub(crate) runtime: Rc<RuntimeInner>,
    core: Cell<Option<Core>>,
    pub(crate) handles: RefCell<HandleStore>,
    pub(crate) references: RefCell<Slab<Rc<RefSlot>>>,
    pub(crate) deferreds: RefCell<Slab<DeferredSlot>>,
    pub(crate) finalizers: Rc<FinalizerQueue>,
    pub(crate) thrown_null: Cell<bool>,
    last_error: Cell<ExtendedErrorInfo>,
    instance_data: RefCell<Option<ExternalInfo>>,
    draining: Cell<bool>,
    _not_send: PhantomData<*mut ()>,
}

impl Env {
    /// Engine state of a live environment
    pub(crate) fn core(&self) -> Result<Core, Status> {
        self.core.get().ok_or(Status::CannotRunJs)
    }

    /// Entry check for operations that may run script
    ///
    /// Refuses to proceed while an exception is pending. An exception found in the
    /// engine slot is put back so the caller can still observe it.
    pub(crate) fn preamble(&self) -> NapiResult<Core> {
        let core = self.core()?;
        if self.thrown_null.get() {
            return Err(Status::PendingException);
        }
        // SAFETY: ctx is live while core is set
        match unsafe { engine::take_exception(core.ctx) } {
            Pending::Clear => Ok(core),
            Pending::Null => {
                self.thrown_null.set(true);
                Err(Status::PendingException)
            }
            Pending::Value(exception) => {
                // SAFETY: hands the exception straight back to the engine
                unsafe { qjs::JS_Throw(core.ctx, exception) };
                Err(Status::PendingException)
            }
        }
    }

    /// Recover the environment from inside an engine callback
    ///
    /// # Safety
    /// `ctx` must be a context created by [`Environment::create`].
    pub(crate) unsafe fn from_context<'a>(ctx: *mut JSContext) -> Option<&'a Env> {
        // SAFETY: the opaque slot points at the boxed Env, or is null after teardown
        unsafe { qjs::JS_GetContextOpaque(ctx).cast::<Env>().as_ref() }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.runtime.config
    }

    pub fn get_version(&self) -> u32 {
        NAPI_VERSION
    }

    /// Store `result` as the last error record and pass it through
    pub fn record<T>(&self, result: NapiResult<T>) -> NapiResult<T> {
        self.last_error
            .set(ExtendedErrorInfo::from_status(Status::of(&result)));
        result
    }

    pub fn last_error_info(&self) -> ExtendedErrorInfo {
        self.last_error.get()
    }

    /// Stable address of the last error record, for the C surface
    pub(crate) fn last_error_ptr(&self) -> *const ExtendedErrorInfo {
        self.last_error.as_ptr()
    }

    pub fn clear_last_error(&self) {
        self.last_error.set(ExtendedErrorInfo::cleared());
    }

    /// Attach per-environment data, finalized once at teardown
    ///
    /// Replacing existing data drops the previous record without running its
    /// finalizer.
    pub fn set_instance_data(
        &self,
        data: *mut c_void,
        finalize: Option<Finalize>,
        hint: *mut c_void,
    ) -> NapiResult<()> {
        self.core()?;
        let previous = self
            .instance_data
            .replace(Some(ExternalInfo::new(data, finalize, hint)));
        if let Some(mut previous) = previous {
            previous.disarm();
        }
        Ok(())
    }

    pub fn get_instance_data(&self) -> NapiResult<Option<*mut c_void>> {
        self.core()?;
        Ok(self.instance_data.borrow().as_ref().map(|info| info.data))
    }

    /// Run an engine collection, then the finalizers it scheduled
    ///
    /// Wrap, `add_finalizer` and external finalizers are all queued by the
    /// collector itself, so no microtask checkpoint is needed to see them run.
    pub fn run_gc(&self) -> NapiResult<()> {
        self.core()?;
        // SAFETY: rt is live for as long as the env holds it
        unsafe { collect(self.runtime.rt) };
        self.drain_finalizers();
        Ok(())
    }

    /// Run finalizers queued by engine-side class finalizers
    pub(crate) fn drain_finalizers(&self) {
        if self.draining.replace(true) {
            return;
        }
        let mut ran = 0usize;
        while let Some(info) = self.finalizers.pop() {
            self.run_finalizer(info);
            ran += 1;
        }
        self.draining.set(false);
        if ran > 0 {
            trace!(count = ran, "finalizers drained");
        }
    }

    pub(crate) fn run_finalizer(&self, mut info: ExternalInfo) {
        if self.core.get().is_some() {
            self.scope(|env| info.finalize(env));
        } else {
            info.finalize(self);
        }
    }

    fn teardown(&self) {
        let Some(core) = self.core.get() else {
            return;
        };
        debug!("environment teardown");
        let rt = self.runtime.rt;

        let released = self.handles.borrow_mut().drain_all();
        for value in released {
            // SAFETY: each handle owned one reference
            unsafe { qjs::JS_FreeValueRT(rt, value) };
        }

        let slots: Vec<Rc<RefSlot>> = self.references.borrow_mut().drain().collect();
        for slot in slots {
            slot.release(rt);
        }

        let deferreds: Vec<DeferredSlot> = self.deferreds.borrow_mut().drain().collect();
        for deferred in deferreds {
            deferred.release(rt);
        }

        let instance_data = self.instance_data.borrow_mut().take();
        if let Some(info) = instance_data {
            self.run_finalizer(info);
        }

        // SAFETY: the context is still live here
        unsafe { collect(rt) };
        self.drain_finalizers();

        self.core.set(None);
        // SAFETY: core is no longer reachable through the env
        unsafe {
            core.release();
            qjs::JS_SetContextOpaque(core.ctx, ptr::null_mut());
            qjs::JS_FreeContext(core.ctx);
            collect(rt);
        }
        self.drain_finalizers();
        debug!("environment freed");
    }
}

/// Owner of an [`Env`]; dropping it tears the environment down
///
/// Teardown releases open scopes, references, unresolved deferreds, runs the
/// instance-data finalizer and every pending finalizer, then frees the context.
pub struct Environment {
    env: Box<Env>,
}

impl Environment {
    pub(crate) fn create(runtime: Rc<RuntimeInner>) -> NapiResult<Self> {
        // SAFETY: rt is live while the Rc is held
        let ctx = unsafe { qjs::JS_NewContext(runtime.rt) };
        if ctx.is_null() {
            return Err(Status::MemoryError);
        }

        // SAFETY: ctx was just created
        let core = match unsafe { Core::init(ctx, &runtime.config) } {
            Ok(core) => core,
            Err(status) => {
                // SAFETY: nothing else references the context
                unsafe { qjs::JS_FreeContext(ctx) };
                return Err(status);
            }
        };

        let env = Box::new(Env {
            runtime,
            core: Cell::new(Some(core)),
            handles: RefCell::new(HandleStore::new()),
            references: RefCell::new(Slab::new()),
            deferreds: RefCell::new(Slab::new()),
            finalizers: Rc::new(FinalizerQueue::default()),
            thrown_null: Cell::new(false),
            last_error: Cell::new(ExtendedErrorInfo::cleared()),
            instance_data: RefCell::new(None),
            draining: Cell::new(false),
            _not_send: PhantomData,
        });

        // SAFETY: the box gives the Env a stable address for the context's lifetime
        unsafe { qjs::JS_SetContextOpaque(ctx, &*env as *const Env as *mut c_void) };
        debug!(?ctx, "environment created");
        Ok(Self { env })
    }

    /// Leak the environment as a raw pointer, for the C surface
    pub fn into_raw(self) -> *mut Env {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the box is moved out exactly once
        let env = unsafe { ptr::read(&this.env) };
        Box::into_raw(env)
    }

    /// Reclaim an environment leaked by [`Environment::into_raw`]
    ///
    /// # Safety
    /// `env` must come from `into_raw` and must not be used afterwards.
    pub unsafe fn from_raw(env: *mut Env) -> Self {
        // SAFETY: forwarded from the caller
        Self {
            env: unsafe { Box::from_raw(env) },
        }
    }
}

impl Deref for Environment {
    type Target = Env;

    fn deref(&self) -> &Env {
        &self.env
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        self.env.teardown();
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ctx = self.env.core.get().map(|core| core.ctx);
        write!(f, "Environment({ctx:?})")
    }
}

/// Full engine collection
///
/// A side-table entry whose key dies inside a cycle drops to a zero count while
/// the cycle is being freed, and only the next pass reclaims it. The second pass
/// lets its finalizer be queued by this call.
///
/// # Safety
/// `rt` must be live.
unsafe fn collect(rt: *mut qjs::JSRuntime) {
    // SAFETY: forwarded from the caller
    unsafe {
        qjs::JS_RunGC(rt);
        qjs::JS_RunGC(rt);
    }
}

/// Script-visible `gc()`
unsafe extern "C" fn gc_native(
    ctx: *mut JSContext,
    _this: JSValue,
    _argc: c_int,
    _argv: *mut JSValue,
    _magic: c_int,
    _data: *mut JSValue,
) -> JSValue {
    // SAFETY: called by the engine with a live context
    unsafe { collect(qjs::JS_GetRuntime(ctx)) };
    qjs::JS_UNDEFINED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;
    use std::rc::Rc;

    #[test]
    fn test_instance_data_finalized_on_teardown() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();

        let mut payload = 5u32;
        let data = &mut payload as *mut u32 as *mut c_void;
        env.set_instance_data(
            data,
            Some(Box::new(move |_env, data, _hint| {
                assert_eq!(unsafe { *(data as *mut u32) }, 5);
                seen.set(seen.get() + 1);
            })),
            ptr::null_mut(),
        )
        .unwrap();
        assert_eq!(env.get_instance_data().unwrap(), Some(data));

        drop(env);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_gc_global_installed() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();
        env.scope(|env| {
            let result = env.run_script_str("typeof gc", "<test>").unwrap();
            assert_eq!(env.get_value_string_utf8(result).unwrap(), "function");
            env.run_script_str("gc()", "<test>").unwrap();
        });
    }

    #[test]
    fn test_gc_global_can_be_disabled() {
        let runtime = Runtime::with_config(RuntimeConfig::new().with_gc_global(false)).unwrap();
        let env = runtime.create_env().unwrap();
        env.scope(|env| {
            let result = env.run_script_str("typeof gc", "<test>").unwrap();
            assert_eq!(env.get_value_string_utf8(result).unwrap(), "undefined");
        });
    }

    #[test]
    fn test_record_updates_last_error() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();
        let _ = env.record::<()>(Err(Status::StringExpected));
        assert_eq!(env.last_error_info().error_code, Status::StringExpected);
        let _ = env.record(Ok(()));
        assert_eq!(env.last_error_info().error_code, Status::Ok);
    }

    #[test]
    fn test_multiple_envs_share_runtime() {
        let runtime = Runtime::new().unwrap();
        let a = runtime.create_env().unwrap();
        let b = runtime.create_env().unwrap();
        a.scope(|a| {
            a.run_script_str("globalThis.marker = 1", "<a>").unwrap();
        });
        b.scope(|b| {
            let result = b.run_script_str("typeof marker", "<b>").unwrap();
            assert_eq!(b.get_value_string_utf8(result).unwrap(), "undefined");
        });
    }
}
