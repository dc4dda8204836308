//! Engine runtime and its dynamically assigned class ids

use std::ffi::{CString, c_void};
use std::marker::PhantomData;
use std::mem;
use std::rc::Rc;

use tracing::debug;

use crate::config::RuntimeConfig;
use crate::engine::{JSClassID, JSRuntime, qjs};
use crate::env::Environment;
use crate::error::{NapiResult, Status};
use crate::external::external_finalizer;
use crate::function::{constructor_finalizer, function_finalizer};

/// Class ids registered once per runtime
///
/// A zero id means "not registered"; objects are never created with it.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ClassIds {
    /// Opaque carriers for externals, wraps and `add_finalizer` records
    pub external: JSClassID,
    /// Per-function native callback records
    pub function: JSClassID,
    /// Prototype objects of classes defined through `define_class`
    pub constructor: JSClassID,
}

pub(crate) struct RuntimeInner {
    pub(crate) rt: *mut JSRuntime,
    pub(crate) classes: ClassIds,
    pub(crate) config: RuntimeConfig,
}

impl RuntimeInner {
    /// Register a new engine class and return its id
    pub(crate) fn register_class(
        &self,
        name: &str,
        finalizer: qjs::JSClassFinalizer,
    ) -> NapiResult<JSClassID> {
        let class_name = CString::new(name).map_err(|_| Status::InvalidArg)?;
        let mut id: JSClassID = 0;

        // SAFETY: rt is live for the lifetime of self; the engine copies the name
        unsafe {
            qjs::JS_NewClassID(self.rt, &mut id);
            if id == 0 {
                return Err(Status::GenericFailure);
            }
            let def = qjs::JSClassDef {
                class_name: class_name.as_ptr(),
                finalizer,
                ..mem::zeroed()
            };
            if qjs::JS_NewClass(self.rt, id, &def) != 0 {
                return Err(Status::MemoryError);
            }
        }

        Ok(id)
    }

    /// Recover the runtime state from inside an engine callback
    ///
    /// # Safety
    /// `rt` must be a runtime created by [`Runtime::with_config`].
    pub(crate) unsafe fn from_engine<'a>(rt: *mut JSRuntime) -> Option<&'a RuntimeInner> {
        // SAFETY: the opaque slot is set to a live RuntimeInner before any object exists
        unsafe { qjs::JS_GetRuntimeOpaque(rt).cast::<RuntimeInner>().as_ref() }
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        // SAFETY: every environment holds an Rc to this runtime, so none remain
        unsafe { qjs::JS_FreeRuntime(self.rt) };
        debug!("runtime freed");
    }
}

/// Owner of one engine instance
///
/// A runtime can host several environments. It stays alive until the last
/// [`Environment`] created from it is dropped.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync`: the engine must only be touched from the
/// thread that created it.
pub struct Runtime {
    inner: Rc<RuntimeInner>,
    _not_send: PhantomData<*mut ()>,
}

impl Runtime {
    /// Create a runtime with default settings
    pub fn new() -> NapiResult<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> NapiResult<Self> {
        // SAFETY: JS_NewRuntime has no preconditions
        let rt = unsafe { qjs::JS_NewRuntime() };
        if rt.is_null() {
            return Err(Status::MemoryError);
        }

        // SAFETY: rt was just created
        unsafe {
            qjs::JS_SetMaxStackSize(rt, config.max_stack_size as _);
            if let Some(limit) = config.memory_limit {
                qjs::JS_SetMemoryLimit(rt, limit as _);
            }
            if let Some(threshold) = config.gc_threshold {
                qjs::JS_SetGCThreshold(rt, threshold as _);
            }
        }

        let mut inner = RuntimeInner {
            rt,
            classes: ClassIds::default(),
            config,
        };
        inner.classes = ClassIds {
            external: inner.register_class("External", Some(external_finalizer))?,
            function: inner.register_class("FunctionData", Some(function_finalizer))?,
            constructor: inner.register_class("ConstructorPrototype", Some(constructor_finalizer))?,
        };

        let inner = Rc::new(inner);
        // SAFETY: the Rc keeps the pointee at a stable address until JS_FreeRuntime
        unsafe { qjs::JS_SetRuntimeOpaque(rt, Rc::as_ptr(&inner) as *mut c_void) };

        debug!(classes = ?inner.classes, "runtime created");
        Ok(Self {
            inner,
            _not_send: PhantomData,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Create an execution environment bound to this runtime
    pub fn create_env(&self) -> NapiResult<Environment> {
        Environment::create(self.inner.clone())
    }

    /// Whether the engine job queue holds unexecuted jobs
    pub fn is_job_pending(&self) -> bool {
        // SAFETY: rt is live
        crate::engine::truthy(unsafe { qjs::JS_IsJobPending(self.inner.rt) })
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Runtime({:?})", self.inner.rt)
    }
}
