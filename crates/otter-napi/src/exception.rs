//! Pending-exception protocol and error construction
//!
//! The environment is in one of three states: clear, an engine-held exception, or a
//! thrown `null` remembered by a flag on the env. Throwing requires the clear
//! state; [`Env::get_and_clear_last_exception`] returns any pending state to clear.

use crate::engine::{self, Owned, Pending, qjs};
use crate::env::{Core, Env};
use crate::error::{NapiResult, Status};
use crate::scope::Value;

/// Constructor used by the error helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    Error = 0,
    TypeError = 1,
    RangeError = 2,
    SyntaxError = 3,
}

impl Env {
    /// Build an error object of `kind`
    ///
    /// # Safety
    /// `core` must belong to this env.
    pub(crate) unsafe fn new_error(
        &self,
        core: Core,
        kind: ErrorKind,
        message: &str,
        code: Option<&str>,
    ) -> NapiResult<Owned> {
        // SAFETY: every argument is owned for the duration of the helper call
        unsafe {
            let kind = Owned::new(core.ctx, engine::new_int32(kind as i32));
            let message = engine::new_string(core.ctx, message)?;
            let code = match code {
                Some(code) => engine::new_string(core.ctx, code)?,
                None => Owned::new(core.ctx, qjs::JS_UNDEFINED),
            };
            engine::call(
                core.ctx,
                core.helpers.make_error,
                qjs::JS_UNDEFINED,
                &[kind.raw(), message.raw(), code.raw()],
            )
        }
    }

    /// Throw a fresh error and report the pending exception
    ///
    /// # Safety
    /// `core` must belong to this env.
    pub(crate) unsafe fn throw_new(
        &self,
        core: Core,
        kind: ErrorKind,
        message: &str,
        code: Option<&str>,
    ) -> Status {
        // SAFETY: forwarded from the caller; JS_Throw takes the error reference
        unsafe {
            match self.new_error(core, kind, message, code) {
                Ok(error) => {
                    qjs::JS_Throw(core.ctx, error.into_raw());
                    Status::PendingException
                }
                Err(status) => status,
            }
        }
    }

    /// Throw `value`; a thrown `null` is remembered by the env
    pub fn throw(&self, value: Value) -> NapiResult<()> {
        let core = self.preamble()?;
        let raw = self.raw(value)?;
        if engine::is_null(raw) {
            self.thrown_null.set(true);
        } else {
            // SAFETY: JS_Throw takes the duplicated reference
            unsafe { qjs::JS_Throw(core.ctx, qjs::JS_DupValue(core.ctx, raw)) };
        }
        Ok(())
    }

    fn throw_kind(&self, kind: ErrorKind, code: Option<&str>, message: &str) -> NapiResult<()> {
        let core = self.preamble()?;
        // SAFETY: core belongs to self
        match unsafe { self.throw_new(core, kind, message, code) } {
            Status::PendingException => Ok(()),
            status => Err(status),
        }
    }

    pub fn throw_error(&self, code: Option<&str>, message: &str) -> NapiResult<()> {
        self.throw_kind(ErrorKind::Error, code, message)
    }

    pub fn throw_type_error(&self, code: Option<&str>, message: &str) -> NapiResult<()> {
        self.throw_kind(ErrorKind::TypeError, code, message)
    }

    pub fn throw_range_error(&self, code: Option<&str>, message: &str) -> NapiResult<()> {
        self.throw_kind(ErrorKind::RangeError, code, message)
    }

    pub fn throw_syntax_error(&self, code: Option<&str>, message: &str) -> NapiResult<()> {
        self.throw_kind(ErrorKind::SyntaxError, code, message)
    }

    pub fn is_exception_pending(&self) -> NapiResult<bool> {
        let core = self.core()?;
        if self.thrown_null.get() {
            return Ok(true);
        }
        // SAFETY: a taken exception is put straight back
        match unsafe { engine::take_exception(core.ctx) } {
            Pending::Clear => Ok(false),
            Pending::Null => {
                self.thrown_null.set(true);
                Ok(true)
            }
            Pending::Value(exception) => {
                unsafe { qjs::JS_Throw(core.ctx, exception) };
                Ok(true)
            }
        }
    }

    /// Take the pending exception, returning `undefined` when there is none
    pub fn get_and_clear_last_exception(&self) -> NapiResult<Value> {
        let core = self.core()?;
        // SAFETY: the taken exception is owned from here on
        let pending = unsafe { engine::take_exception(core.ctx) };
        if self.thrown_null.replace(false) {
            if let Pending::Value(exception) = pending {
                // SAFETY: a stray engine exception is released
                unsafe { qjs::JS_FreeValue(core.ctx, exception) };
            }
            return self.push_plain(qjs::JS_NULL);
        }
        match pending {
            Pending::Clear => self.push_plain(qjs::JS_UNDEFINED),
            Pending::Null => self.push_plain(qjs::JS_NULL),
            // SAFETY: the exception reference moves into the scope
            Pending::Value(exception) => self.push(unsafe { Owned::new(core.ctx, exception) }),
        }
    }

    fn create_kind(&self, kind: ErrorKind, code: Option<Value>, message: Value) -> NapiResult<Value> {
        let core = self.core()?;
        let raw = self.raw(message)?;
        if !engine::is_string(raw) {
            return Err(Status::StringExpected);
        }
        // SAFETY: both strings are live while their handles are
        let message = unsafe { engine::to_rust_string(core.ctx, raw)? };
        let code = match code {
            Some(code) => {
                let raw = self.raw(code)?;
                if !engine::is_string(raw) {
                    return Err(Status::StringExpected);
                }
                Some(unsafe { engine::to_rust_string(core.ctx, raw)? })
            }
            None => None,
        };
        // SAFETY: core belongs to self
        let error = unsafe { self.new_error(core, kind, &message, code.as_deref())? };
        self.push(error)
    }

    /// `new Error(message)`, with `code` set when given
    pub fn create_error(&self, code: Option<Value>, message: Value) -> NapiResult<Value> {
        self.create_kind(ErrorKind::Error, code, message)
    }

    pub fn create_type_error(&self, code: Option<Value>, message: Value) -> NapiResult<Value> {
        self.create_kind(ErrorKind::TypeError, code, message)
    }

    pub fn create_range_error(&self, code: Option<Value>, message: Value) -> NapiResult<Value> {
        self.create_kind(ErrorKind::RangeError, code, message)
    }

    pub fn create_syntax_error(&self, code: Option<Value>, message: Value) -> NapiResult<Value> {
        self.create_kind(ErrorKind::SyntaxError, code, message)
    }

    pub fn is_error(&self, value: Value) -> NapiResult<bool> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        if !engine::is_object(raw) {
            return Ok(false);
        }
        // SAFETY: raw is live while its handle is
        unsafe { self.predicate(core, core.helpers.is_error, &[raw]) }
    }
}
