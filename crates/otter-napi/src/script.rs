//! Script evaluation and the microtask queue

use std::ptr;

use tracing::{trace, warn};

use crate::engine::{self, JSContext, Pending, qjs};
use crate::env::Env;
use crate::error::{NapiResult, Status};
use crate::scope::Value;

impl Env {
    /// Evaluate a script string in global scope
    pub fn run_script(&self, script: Value) -> NapiResult<Value> {
        let core = self.preamble()?;
        let raw = self.raw(script)?;
        if !engine::is_string(raw) {
            return Err(Status::StringExpected);
        }
        // SAFETY: raw is a live string
        let source = unsafe { engine::to_rust_string(core.ctx, raw)? };
        self.run_script_str(&source, "<anonymous>")
    }

    /// Evaluate `source` in global scope, then drain microtasks
    ///
    /// A throwing script yields `PendingException` and leaves the exception pending.
    pub fn run_script_str(&self, source: &str, filename: &str) -> NapiResult<Value> {
        let core = self.preamble()?;
        // SAFETY: ctx is live while core is set
        let result = unsafe { engine::eval(core.ctx, source, filename) };
        match result {
            Ok(value) => {
                let value = self.push(value)?;
                self.run_microtasks()?;
                Ok(value)
            }
            Err(Status::PendingException) => {
                // SAFETY: the exception is set aside while jobs run, then restored
                unsafe {
                    let pending = engine::take_exception(core.ctx);
                    self.execute_jobs();
                    self.drain_finalizers();
                    match pending {
                        Pending::Clear => {}
                        Pending::Null => self.thrown_null.set(true),
                        Pending::Value(exception) => {
                            qjs::JS_Throw(core.ctx, exception);
                        }
                    }
                }
                Err(Status::PendingException)
            }
            Err(status) => Err(status),
        }
    }

    /// Run queued promise jobs until the queue is empty, then pending finalizers
    ///
    /// A job that throws is logged and skipped.
    pub fn run_microtasks(&self) -> NapiResult<()> {
        self.preamble()?;
        self.execute_jobs();
        self.drain_finalizers();
        Ok(())
    }

    fn execute_jobs(&self) {
        let rt = self.runtime.rt;
        let mut ran = 0usize;
        loop {
            let mut job_ctx: *mut JSContext = ptr::null_mut();
            // SAFETY: rt is live; the engine reports the context of a failed job
            let rc = unsafe { qjs::JS_ExecutePendingJob(rt, &mut job_ctx) };
            if rc == 0 {
                break;
            }
            ran += 1;
            if rc < 0 && !job_ctx.is_null() {
                // SAFETY: job_ctx is the live context the job ran in
                unsafe { report_job_exception(job_ctx) };
            }
        }
        if ran > 0 {
            trace!(jobs = ran, "microtasks drained");
        }
    }
}

/// # Safety
/// `ctx` must be live.
unsafe fn report_job_exception(ctx: *mut JSContext) {
    // SAFETY: the taken exception is owned and released here
    unsafe {
        match engine::take_exception(ctx) {
            Pending::Clear => {}
            Pending::Null => warn!("microtask threw null"),
            Pending::Value(exception) => {
                let message = engine::to_rust_string(ctx, exception).unwrap_or_else(|_| {
                    // ToString itself threw
                    engine::discard_exception(ctx);
                    "<unprintable exception>".to_string()
                });
                warn!(%message, "microtask threw");
                qjs::JS_FreeValue(ctx, exception);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;

    #[test]
    fn test_run_script_returns_completion_value() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            let source = env.create_string_utf8("[1, 2, 3].map((x) => x * 2).join()").unwrap();
            let result = env.run_script(source).unwrap();
            assert_eq!(env.get_value_string_utf8(result).unwrap(), "2,4,6");

            let number = env.create_int32(1).unwrap();
            assert_eq!(env.run_script(number), Err(Status::StringExpected));
        });
    }

    #[test]
    fn test_syntax_error_stays_pending() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            assert_eq!(
                env.run_script_str("let = = 1", "<test>"),
                Err(Status::PendingException)
            );
            let error = env.get_and_clear_last_exception().unwrap();
            let name = env.get_named_property(error, "name").unwrap();
            assert_eq!(env.get_value_string_utf8(name).unwrap(), "SyntaxError");
        });
    }

    #[test]
    fn test_microtasks_run_after_script() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            env.run_script_str(
                "globalThis.order = []; Promise.resolve().then(() => order.push('job')); order.push('sync')",
                "<test>",
            )
            .unwrap();
            assert!(!runtime.is_job_pending());
            let order = env.run_script_str("order.join()", "<test>").unwrap();
            assert_eq!(env.get_value_string_utf8(order).unwrap(), "sync,job");
        });
    }

    #[test]
    fn test_microtasks_run_even_when_script_throws() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            assert_eq!(
                env.run_script_str(
                    "globalThis.ran = false; Promise.resolve().then(() => { ran = true; }); throw 1",
                    "<test>",
                ),
                Err(Status::PendingException)
            );
            let thrown = env.get_and_clear_last_exception().unwrap();
            assert_eq!(env.get_value_int32(thrown).unwrap(), 1);
            let ran = env.run_script_str("ran", "<test>").unwrap();
            assert!(env.get_value_bool(ran).unwrap());
        });
    }

    #[test]
    fn test_throwing_job_is_skipped() {
        let runtime = Runtime::new().unwrap();
        let env = runtime.create_env().unwrap();

        env.scope(|env| {
            env.run_script_str(
                "globalThis.after = false;\
                 Promise.resolve().then(() => { throw new Error('job'); });\
                 Promise.resolve().then(() => { after = true; });",
                "<test>",
            )
            .unwrap();
            assert!(!env.is_exception_pending().unwrap());
            let after = env.run_script_str("after", "<test>").unwrap();
            assert!(env.get_value_bool(after).unwrap());
        });
    }
}
