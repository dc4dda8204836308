//! Native functions and classes
//!
//! A native function is an engine C function whose single data slot holds a
//! function-class object carrying the boxed [`FunctionInfo`]. Classes keep their
//! [`ConstructorInfo`] on the prototype instead, so a script subclass without a
//! native constructor still finds it by walking up from `new.target.prototype`.

use std::any::Any;
use std::ffi::{CString, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;
use std::rc::Rc;

use tracing::{debug, error, warn};

use crate::engine::{self, JSClassID, JSContext, JSRuntime, JSValue, Owned, Pending, qjs};
use crate::env::{Core, Env};
use crate::error::{NapiResult, Status, fatal_error};
use crate::exception::ErrorKind;
use crate::property::PropertyDescriptor;
use crate::runtime::RuntimeInner;
use crate::scope::Value;

/// Native callback signature
///
/// Returning `Ok(None)` yields `undefined`. An `Err` with no exception pending is
/// thrown into script as an `Error` carrying the status message.
pub type Callback = dyn Fn(&Env, &CallbackInfo) -> NapiResult<Option<Value>>;

/// Share a closure as a [`Callback`] for property descriptors
pub fn callback(
    f: impl Fn(&Env, &CallbackInfo) -> NapiResult<Option<Value>> + 'static,
) -> Rc<Callback> {
    Rc::new(f)
}

/// Arguments of one native call; valid only for the duration of the callback
#[derive(Debug)]
pub struct CallbackInfo {
    this: Value,
    new_target: Option<Value>,
    args: Vec<Value>,
    data: *mut c_void,
}

impl CallbackInfo {
    /// Receiver of the call; the global object for plain function calls
    pub fn this(&self) -> Value {
        self.this
    }

    /// `new.target` when invoked as a constructor
    pub fn new_target(&self) -> Option<Value> {
        self.new_target
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<Value> {
        self.args.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Pointer given when the function or class was created
    pub fn data(&self) -> *mut c_void {
        self.data
    }
}

pub(crate) struct FunctionInfo {
    callback: Rc<Callback>,
    data: *mut c_void,
}

pub(crate) struct ConstructorInfo {
    function: FunctionInfo,
    class_id: JSClassID,
}

/// Class finalizer of function records
pub(crate) unsafe extern "C" fn function_finalizer(rt: *mut JSRuntime, value: JSValue) {
    // SAFETY: the runtime opaque is set before any record is created
    let Some(inner) = (unsafe { RuntimeInner::from_engine(rt) }) else {
        return;
    };
    // SAFETY: objects of this class hold a boxed FunctionInfo or null
    let info = unsafe { engine::opaque::<FunctionInfo>(value, inner.classes.function) };
    if !info.is_null() {
        // SAFETY: the collector calls this exactly once per object
        drop(unsafe { Box::from_raw(info) });
    }
}

/// Class finalizer of class prototypes
pub(crate) unsafe extern "C" fn constructor_finalizer(rt: *mut JSRuntime, value: JSValue) {
    // SAFETY: the runtime opaque is set before any prototype is created
    let Some(inner) = (unsafe { RuntimeInner::from_engine(rt) }) else {
        return;
    };
    // SAFETY: objects of this class hold a boxed ConstructorInfo or null
    let info = unsafe { engine::opaque::<ConstructorInfo>(value, inner.classes.constructor) };
    if !info.is_null() {
        // SAFETY: the collector calls this exactly once per object
        drop(unsafe { Box::from_raw(info) });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("native callback panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("native callback panicked: {}", s)
    } else {
        "native callback panicked".to_string()
    }
}

/// Borrow the engine's argument vector
///
/// # Safety
/// `argv` must hold `argc` values when non-null.
unsafe fn arguments<'a>(argc: c_int, argv: *mut JSValue) -> &'a [JSValue] {
    if argv.is_null() || argc <= 0 {
        return &[];
    }
    // SAFETY: forwarded from the caller
    unsafe { std::slice::from_raw_parts(argv, argc as usize) }
}

/// Engine entry point of every native function
unsafe extern "C" fn function_trampoline(
    ctx: *mut JSContext,
    this: JSValue,
    argc: c_int,
    argv: *mut JSValue,
    _magic: c_int,
    func_data: *mut JSValue,
) -> JSValue {
    // SAFETY: called by the engine with a live context
    let Some(env) = (unsafe { Env::from_context(ctx) }) else {
        return qjs::JS_UNDEFINED;
    };
    let Ok(core) = env.core() else {
        return qjs::JS_UNDEFINED;
    };
    if func_data.is_null() {
        return qjs::JS_UNDEFINED;
    }
    // SAFETY: the function was created with one data slot holding its record
    let info = unsafe { engine::opaque::<FunctionInfo>(*func_data, env.runtime.classes.function) };
    // SAFETY: the record lives as long as the function that holds it
    let Some(info) = (unsafe { info.as_ref() }) else {
        return qjs::JS_UNDEFINED;
    };
    let this = if engine::is_undefined(this) { core.global } else { this };
    // SAFETY: every value is borrowed from the engine for the duration of the call
    unsafe {
        env.invoke(
            core,
            &*info.callback,
            info.data,
            this,
            None,
            arguments(argc, argv),
        )
    }
}

/// Engine entry point of every class constructor
unsafe extern "C" fn constructor_trampoline(
    ctx: *mut JSContext,
    new_target: JSValue,
    argc: c_int,
    argv: *mut JSValue,
    _magic: c_int,
    _func_data: *mut JSValue,
) -> JSValue {
    // SAFETY: called by the engine with a live context
    let Some(env) = (unsafe { Env::from_context(ctx) }) else {
        return qjs::JS_UNDEFINED;
    };
    let Ok(core) = env.core() else {
        return qjs::JS_UNDEFINED;
    };

    // SAFETY: all engine values are owned or borrowed for the duration of the call
    unsafe {
        // A `new` call hands the engine function `new.target` as the receiver
        if !engine::is_function(ctx, new_target) {
            return env.raise(
                core,
                ErrorKind::TypeError,
                "Class constructor cannot be invoked without 'new'",
            );
        }

        let prototype = match engine::checked(
            ctx,
            qjs::JS_GetPropertyStr(ctx, new_target, c"prototype".as_ptr()),
        ) {
            Ok(prototype) => prototype,
            Err(_) => return qjs::JS_EXCEPTION,
        };
        let info = match env.find_constructor(core, prototype.raw()) {
            Ok(info) => info,
            Err(_) => return qjs::JS_EXCEPTION,
        };
        let Some(info) = info.as_ref() else {
            fatal_error("constructor_trampoline", "no class metadata on the prototype chain");
        };

        let instance = match engine::new_class_object(ctx, prototype.raw(), info.class_id, ptr::null_mut()) {
            Ok(instance) => instance,
            Err(_) => return qjs::JS_EXCEPTION,
        };
        let result = env.invoke(
            core,
            &*info.function.callback,
            info.function.data,
            instance.raw(),
            Some(new_target),
            arguments(argc, argv),
        );
        if engine::is_exception(result) || engine::is_object(result) {
            return result;
        }
        qjs::JS_FreeValue(ctx, result);
        instance.into_raw()
    }
}

impl Env {
    /// Walk from `prototype` up its chain to the first class prototype
    ///
    /// # Safety
    /// `prototype` must be live in `core.ctx`.
    unsafe fn find_constructor(&self, core: Core, prototype: JSValue) -> NapiResult<*mut ConstructorInfo> {
        let class = self.runtime.classes.constructor;
        // SAFETY: forwarded from the caller
        unsafe {
            let mut current = Owned::dup(core.ctx, prototype);
            while engine::is_object(current.raw()) {
                let info = engine::opaque::<ConstructorInfo>(current.raw(), class);
                if !info.is_null() {
                    return Ok(info);
                }
                current = engine::call(
                    core.ctx,
                    core.helpers.get_prototype_of,
                    qjs::JS_UNDEFINED,
                    &[current.raw()],
                )?;
            }
        }
        Ok(ptr::null_mut())
    }

    /// Run a native callback inside its own handle scope
    ///
    /// Returns an owned result, or the exception sentinel with the failure thrown.
    ///
    /// # Safety
    /// `core` must belong to this env and every value must be live in `core.ctx`.
    pub(crate) unsafe fn invoke(
        &self,
        core: Core,
        callback: &Callback,
        data: *mut c_void,
        this: JSValue,
        new_target: Option<JSValue>,
        args: &[JSValue],
    ) -> JSValue {
        let ctx = core.ctx;
        let scope = self.open_handle_scope();

        // SAFETY: forwarded from the caller; each handle owns a fresh reference
        let dup = |raw: JSValue| self.push(unsafe { Owned::dup(ctx, raw) });
        let info = (|| -> NapiResult<CallbackInfo> {
            Ok(CallbackInfo {
                this: dup(this)?,
                new_target: new_target.map(dup).transpose()?,
                args: args.iter().map(|arg| dup(*arg)).collect::<NapiResult<_>>()?,
                data,
            })
        })();

        let outcome = match info {
            Ok(info) => match catch_unwind(AssertUnwindSafe(|| callback(self, &info))) {
                Ok(Ok(Some(value))) => match self.raw(value) {
                    // SAFETY: the handle is still open; the duplicate outlives the scope
                    Ok(raw) => Ok(unsafe { qjs::JS_DupValue(ctx, raw) }),
                    Err(status) => Err(status.to_string()),
                },
                Ok(Ok(None)) => Ok(qjs::JS_UNDEFINED),
                Ok(Err(status)) => Err(status.to_string()),
                Err(panic) => {
                    let message = panic_message(&*panic);
                    error!("{}", message);
                    Err(message)
                }
            },
            Err(status) => Err(status.to_string()),
        };
        self.unwind_handle_scope(scope);

        // SAFETY: ctx is live; exceptions are handed back to the engine
        unsafe {
            let pending = if self.thrown_null.replace(false) {
                engine::discard_exception(ctx);
                Some(qjs::JS_NULL)
            } else {
                match engine::take_exception(ctx) {
                    Pending::Clear => None,
                    Pending::Null => Some(qjs::JS_NULL),
                    Pending::Value(exception) => Some(exception),
                }
            };
            if let Some(exception) = pending {
                if let Ok(result) = outcome {
                    qjs::JS_FreeValue(ctx, result);
                }
                qjs::JS_Throw(ctx, exception);
                return qjs::JS_EXCEPTION;
            }
            match outcome {
                Ok(result) => result,
                Err(message) => self.raise(core, ErrorKind::Error, &message),
            }
        }
    }

    /// Throw a new error and return the exception sentinel
    ///
    /// If the error object cannot be built and nothing is pending, a plain engine
    /// error carrying the same message is thrown instead.
    ///
    /// # Safety
    /// `core` must belong to this env.
    unsafe fn raise(&self, core: Core, kind: ErrorKind, message: &str) -> JSValue {
        // SAFETY: forwarded from the caller; the format string consumes one C string
        unsafe {
            let status = self.throw_new(core, kind, message, None);
            if !qjs::JS_HasException(core.ctx) {
                warn!(%status, message, "error object could not be built");
                let text = CString::new(message.replace('\0', " ")).unwrap_or_default();
                qjs::JS_ThrowPlainError(core.ctx, c"%s".as_ptr(), text.as_ptr());
            }
            qjs::JS_EXCEPTION
        }
    }

    /// Engine function backed by `callback`
    ///
    /// # Safety
    /// `core` must belong to this env.
    pub(crate) unsafe fn new_function_raw(
        &self,
        core: Core,
        name: &str,
        callback: Rc<Callback>,
        data: *mut c_void,
    ) -> NapiResult<Owned> {
        let ctx = core.ctx;
        let info = Box::into_raw(Box::new(FunctionInfo { callback, data }));
        // SAFETY: the record is reclaimed here unless the holder took it
        unsafe {
            let holder = engine::new_class_object(ctx, qjs::JS_NULL, self.runtime.classes.function, info.cast())
                .inspect_err(|_| drop(Box::from_raw(info)))?;
            let mut slots = [holder.raw()];
            let function = engine::checked(
                ctx,
                qjs::JS_NewCFunctionData(ctx, Some(function_trampoline), 0, 0, 1, slots.as_mut_ptr()),
            )?;
            self.set_function_name(core, &function, name)?;
            Ok(function)
        }
    }

    /// # Safety
    /// `core` must belong to this env and `function` must be live in it.
    unsafe fn set_function_name(&self, core: Core, function: &Owned, name: &str) -> NapiResult<()> {
        if name.is_empty() {
            return Ok(());
        }
        // SAFETY: the name value is consumed by the define call
        unsafe {
            let name = engine::new_string(core.ctx, name)?;
            let rc = qjs::JS_DefinePropertyValueStr(
                core.ctx,
                function.raw(),
                c"name".as_ptr(),
                name.into_raw(),
                engine::PROP_CONFIGURABLE,
            );
            if rc < 0 {
                return Err(Status::PendingException);
            }
        }
        Ok(())
    }

    /// Script function that runs `callback`
    pub fn create_function(
        &self,
        name: &str,
        data: *mut c_void,
        callback: impl Fn(&Env, &CallbackInfo) -> NapiResult<Option<Value>> + 'static,
    ) -> NapiResult<Value> {
        let core = self.preamble()?;
        // SAFETY: core belongs to self
        let function = unsafe { self.new_function_raw(core, name, Rc::new(callback), data)? };
        self.push(function)
    }

    /// Define a class whose constructor runs `constructor` with a fresh `this`
    ///
    /// Static descriptors land on the constructor, the others on the prototype.
    pub fn define_class(
        &self,
        name: &str,
        data: *mut c_void,
        constructor: impl Fn(&Env, &CallbackInfo) -> NapiResult<Option<Value>> + 'static,
        properties: &[PropertyDescriptor],
    ) -> NapiResult<Value> {
        let core = self.preamble()?;
        let ctx = core.ctx;
        let class_id = self.runtime.register_class(name, None)?;
        let info = Box::into_raw(Box::new(ConstructorInfo {
            function: FunctionInfo {
                callback: Rc::new(constructor),
                data,
            },
            class_id,
        }));

        // SAFETY: the record is reclaimed here unless the prototype took it
        unsafe {
            let prototype = engine::new_class_object(
                ctx,
                core.helpers.object_prototype,
                self.runtime.classes.constructor,
                info.cast(),
            )
            .inspect_err(|_| drop(Box::from_raw(info)))?;

            let class = engine::checked(
                ctx,
                qjs::JS_NewCFunctionData(ctx, Some(constructor_trampoline), 0, 0, 0, ptr::null_mut()),
            )?;
            let _ = qjs::JS_SetConstructorBit(ctx, class.raw(), true);
            self.set_function_name(core, &class, name)?;

            for property in properties {
                let target = if property.is_static() { class.raw() } else { prototype.raw() };
                self.define_on(core, target, property)?;
            }

            qjs::JS_SetConstructor(ctx, class.raw(), prototype.raw());
            qjs::JS_SetClassProto(ctx, class_id, prototype.into_raw());
            debug!(name, class_id, properties = properties.len(), "class defined");
            self.push(class)
        }
    }

    /// Call `function` with `recv` as `this`; the global object when `None`
    pub fn call_function(&self, recv: Option<Value>, function: Value, args: &[Value]) -> NapiResult<Value> {
        let core = self.preamble()?;
        let function = self.raw(function)?;
        let this = match recv {
            Some(recv) => self.raw(recv)?,
            None => core.global,
        };
        let args = args
            .iter()
            .map(|arg| self.raw(*arg))
            .collect::<NapiResult<Vec<_>>>()?;
        // SAFETY: every value is live while its handle is
        unsafe {
            if !engine::is_function(core.ctx, function) {
                return Err(Status::FunctionExpected);
            }
            let result = engine::call(core.ctx, function, this, &args)?;
            self.push(result)
        }
    }

    /// `new constructor(...args)`
    pub fn new_instance(&self, constructor: Value, args: &[Value]) -> NapiResult<Value> {
        let core = self.preamble()?;
        let constructor = self.raw(constructor)?;
        let mut args = args
            .iter()
            .map(|arg| self.raw(*arg))
            .collect::<NapiResult<Vec<_>>>()?;
        // SAFETY: every value is live while its handle is
        unsafe {
            if !engine::is_function(core.ctx, constructor) {
                return Err(Status::FunctionExpected);
            }
            let instance = engine::checked(
                core.ctx,
                qjs::JS_CallConstructor(core.ctx, constructor, args.len() as c_int, args.as_mut_ptr()),
            )?;
            self.push(instance)
        }
    }

    /// First `count` arguments, padded with `undefined`
    pub fn get_cb_info(&self, info: &CallbackInfo, count: usize) -> NapiResult<Vec<Value>> {
        let mut args: Vec<Value> = info.args.iter().take(count).copied().collect();
        if args.len() < count {
            let undefined = self.get_undefined()?;
            args.resize(count, undefined);
        }
        Ok(args)
    }

    pub fn get_new_target(&self, info: &CallbackInfo) -> NapiResult<Option<Value>> {
        self.core()?;
        if let Some(target) = info.new_target {
            if self.raw(target).is_err() {
                warn!("new.target handle used after its callback returned");
                return Err(Status::InvalidArg);
            }
        }
        Ok(info.new_target)
    }
}
