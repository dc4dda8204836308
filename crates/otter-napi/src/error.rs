//! Status codes and last-error bookkeeping
//!
//! Every operation on [`Env`](crate::Env) returns a [`NapiResult`]. The error side is a
//! [`Status`], whose discriminants match the Node-API `napi_status` ABI so the C
//! surface can hand them out unchanged.

use std::ffi::{CStr, c_char, c_void};
use std::ptr;

use thiserror::Error;

/// Outcome of a binding-layer operation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    #[error("ok")]
    Ok = 0,

    #[error("Invalid argument")]
    InvalidArg,

    #[error("An object was expected")]
    ObjectExpected,

    #[error("A string was expected")]
    StringExpected,

    #[error("A string or symbol was expected")]
    NameExpected,

    #[error("A function was expected")]
    FunctionExpected,

    #[error("A number was expected")]
    NumberExpected,

    #[error("A boolean was expected")]
    BooleanExpected,

    #[error("An array was expected")]
    ArrayExpected,

    #[error("Unknown failure")]
    GenericFailure,

    #[error("An exception is pending")]
    PendingException,

    #[error("The async work item was cancelled")]
    Cancelled,

    #[error("napi_escape_handle already called on scope")]
    EscapeCalledTwice,

    /// No scope is open, or a scope was closed out of order
    #[error("Invalid handle scope usage")]
    HandleScopeEmpty,

    #[error("Invalid callback scope usage")]
    CallbackScopeMismatch,

    #[error("Thread-safe function queue is full")]
    QueueFull,

    #[error("Thread-safe function handle is closing")]
    Closing,

    #[error("A bigint was expected")]
    BigintExpected,

    #[error("A date was expected")]
    DateExpected,

    #[error("An arraybuffer was expected")]
    ArraybufferExpected,

    #[error("A detachable arraybuffer was expected")]
    DetachableArraybufferExpected,

    #[error("Main thread would deadlock")]
    WouldDeadlock,

    #[error("Out of memory")]
    MemoryError,

    /// The environment has been torn down
    #[error("Cannot run JavaScript")]
    CannotRunJs,
}

impl Status {
    /// Static NUL-terminated message for the C error-info struct
    pub fn message_cstr(self) -> &'static CStr {
        match self {
            Status::Ok => c"ok",
            Status::InvalidArg => c"Invalid argument",
            Status::ObjectExpected => c"An object was expected",
            Status::StringExpected => c"A string was expected",
            Status::NameExpected => c"A string or symbol was expected",
            Status::FunctionExpected => c"A function was expected",
            Status::NumberExpected => c"A number was expected",
            Status::BooleanExpected => c"A boolean was expected",
            Status::ArrayExpected => c"An array was expected",
            Status::GenericFailure => c"Unknown failure",
            Status::PendingException => c"An exception is pending",
            Status::Cancelled => c"The async work item was cancelled",
            Status::EscapeCalledTwice => c"napi_escape_handle already called on scope",
            Status::HandleScopeEmpty => c"Invalid handle scope usage",
            Status::CallbackScopeMismatch => c"Invalid callback scope usage",
            Status::QueueFull => c"Thread-safe function queue is full",
            Status::Closing => c"Thread-safe function handle is closing",
            Status::BigintExpected => c"A bigint was expected",
            Status::DateExpected => c"A date was expected",
            Status::ArraybufferExpected => c"An arraybuffer was expected",
            Status::DetachableArraybufferExpected => c"A detachable arraybuffer was expected",
            Status::WouldDeadlock => c"Main thread would deadlock",
            Status::MemoryError => c"Out of memory",
            Status::CannotRunJs => c"Cannot run JavaScript",
        }
    }

    /// Fold a result into the status it reports
    pub fn of<T>(result: &NapiResult<T>) -> Status {
        match result {
            Ok(_) => Status::Ok,
            Err(status) => *status,
        }
    }
}

/// Result type alias for binding-layer operations
pub type NapiResult<T> = Result<T, Status>;

/// Record of the most recent failing call, laid out as `napi_extended_error_info`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExtendedErrorInfo {
    pub error_message: *const c_char,
    pub engine_reserved: *mut c_void,
    pub engine_error_code: u32,
    pub error_code: Status,
}

impl ExtendedErrorInfo {
    pub(crate) fn cleared() -> Self {
        Self {
            error_message: ptr::null(),
            engine_reserved: ptr::null_mut(),
            engine_error_code: 0,
            error_code: Status::Ok,
        }
    }

    pub(crate) fn from_status(status: Status) -> Self {
        if status == Status::Ok {
            return Self::cleared();
        }
        Self {
            error_message: status.message_cstr().as_ptr(),
            engine_reserved: ptr::null_mut(),
            engine_error_code: 0,
            error_code: status,
        }
    }

    /// Message of the recorded error, if any
    pub fn message(&self) -> Option<&'static str> {
        if self.error_message.is_null() {
            return None;
        }
        Some(self.error_code.message_cstr().to_str().unwrap_or_default())
    }
}

/// Abort the process after an unrecoverable embedding error
///
/// Used where continuing would corrupt engine state, such as a zero class id or a
/// constructor whose native metadata cannot be found.
pub fn fatal_error(location: &str, message: &str) -> ! {
    tracing::error!(location, message, "fatal binding error");
    eprintln!("FATAL ERROR: {location} {message}");
    std::process::abort()
}
