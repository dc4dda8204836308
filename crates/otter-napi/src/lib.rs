//! Node-API compatible embedding layer over QuickJS.
//!
//! This crate lets native code drive a script engine through the Node-API
//! model: scope-owned [`Value`] handles, counted [`Reference`]s, externals with
//! finalizers, native functions and classes, a pending-exception state machine
//! and promise deferreds. The safe surface lives on [`Env`]; the `capi` module
//! exports the same operations as `napi_*` C symbols.
//!
//! # Example
//!
//! ```
//! use otter_napi::Runtime;
//!
//! let runtime = Runtime::new().unwrap();
//! let env = runtime.create_env().unwrap();
//!
//! env.scope(|env| {
//!     let add = env
//!         .create_function("add", std::ptr::null_mut(), |env, info| {
//!             let a = env.get_value_double(info.arg(0).unwrap())?;
//!             let b = env.get_value_double(info.arg(1).unwrap())?;
//!             env.create_double(a + b).map(Some)
//!         })
//!         .unwrap();
//!     let global = env.get_global().unwrap();
//!     env.set_named_property(global, "add", add).unwrap();
//!
//!     let result = env.run_script_str("add(2, 3)", "<example>").unwrap();
//!     assert_eq!(env.get_value_double(result).unwrap(), 5.0);
//! });
//! ```
//!
//! # Thread Safety
//!
//! [`Runtime`], [`Environment`] and [`Env`] are `!Send` and `!Sync`: the engine
//! must only be used from the thread that created the runtime. Run one runtime
//! per thread for parallel work.
//!
//! ## Example: Wrong (won't compile)
//!
//! ```compile_fail
//! use otter_napi::Runtime;
//! use std::thread;
//!
//! let runtime = Runtime::new().unwrap();
//! let env = runtime.create_env().unwrap();
//! thread::spawn(move || {
//!     let _ = env.get_undefined(); // Error: Environment is !Send
//! });
//! ```

mod bigint;
mod buffer;
#[cfg(target_pointer_width = "64")]
pub mod capi;
mod config;
mod engine;
mod env;
mod error;
mod exception;
mod external;
mod function;
mod helpers;
mod promise;
mod property;
mod reference;
mod runtime;
mod scope;
mod script;
mod value;

pub use bigint::BigintWords;
pub use buffer::{DataViewInfo, TypedArrayInfo, TypedArrayType};
pub use config::{DEFAULT_BIGINT_MAX_WORDS, RuntimeConfig};
pub use env::{Env, Environment, NAPI_VERSION};
pub use error::{ExtendedErrorInfo, NapiResult, Status, fatal_error};
pub use external::{Finalize, TypeTag};
pub use function::{Callback, CallbackInfo, callback};
pub use promise::Deferred;
pub use property::{
    KeyCollectionMode, KeyConversion, KeyFilter, PropertyAttributes, PropertyDescriptor, PropertyKey,
};
pub use reference::Reference;
pub use runtime::Runtime;
pub use scope::{EscapableHandleScope, HandleScope, HandleStats, Value};
pub use value::ValueType;
