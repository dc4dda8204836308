use std::ptr;

use otter_napi::{CallbackInfo, Env, NapiResult, Runtime, Status, Value};

fn install(env: &Env, name: &str, f: impl Fn(&Env, &CallbackInfo) -> NapiResult<Option<Value>> + 'static) {
    let function = env.create_function(name, ptr::null_mut(), f).unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, name, function).unwrap();
}

fn eval_string(env: &Env, source: &str) -> String {
    let value = env.run_script_str(source, "<test>").unwrap();
    env.get_value_string_utf8(value).unwrap()
}

#[test]
fn native_throw_is_catchable_in_script() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        install(env, "reject", |env, _info| {
            env.throw_type_error(Some("ERR_REJECTED"), "rejected")?;
            Ok(None)
        });
        let caught = eval_string(
            env,
            "try { reject(); 'no' } catch (e) { `${e instanceof TypeError}:${e.code}:${e.message}` }",
        );
        assert_eq!(caught, "true:ERR_REJECTED:rejected");
        assert!(!env.is_exception_pending().unwrap());
    });
}

#[test]
fn status_error_becomes_script_error() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        install(env, "needs_string", |env, info| {
            let text = env.get_value_string_utf8(info.arg(0).ok_or(Status::InvalidArg)?)?;
            env.create_string_utf8(&text.to_uppercase()).map(Some)
        });
        assert_eq!(eval_string(env, "needs_string('ok')"), "OK");
        let caught = eval_string(env, "try { needs_string(1) } catch (e) { e.message }");
        assert_eq!(caught, "A string was expected");
    });
}

#[test]
fn panic_is_contained_at_the_boundary() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        install(env, "explode", |_env, _info| panic!("boom"));
        let caught = eval_string(env, "try { explode() } catch (e) { e.message }");
        assert_eq!(caught, "native callback panicked: boom");

        let still_alive = env.run_script_str("1 + 1", "<test>").unwrap();
        assert_eq!(env.get_value_int32(still_alive).unwrap(), 2);
        assert_eq!(env.handle_stats().open_scopes, 1);
    });
}

#[test]
fn thrown_null_crosses_the_boundary() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        install(env, "throw_null", |env, _info| {
            env.throw(env.get_null()?)?;
            Ok(None)
        });
        let caught = env
            .run_script_str("try { throw_null(); false } catch (e) { e === null }", "<test>")
            .unwrap();
        assert!(env.get_value_bool(caught).unwrap());
        assert!(!env.is_exception_pending().unwrap());
    });
}

#[test]
fn exception_propagates_through_nested_calls() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        install(env, "relay", |env, info| {
            let callee = info.arg(0).ok_or(Status::InvalidArg)?;
            env.call_function(None, callee, &[]).map(Some)
        });
        let caught = eval_string(
            env,
            "function deep() { throw new RangeError('deep') }\
             try { relay(deep) } catch (e) { `${e.name}:${e.message}` }",
        );
        assert_eq!(caught, "RangeError:deep");
    });
}

#[test]
fn pending_exception_blocks_engine_calls() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        assert_eq!(
            env.run_script_str("throw new Error('left pending')", "<test>"),
            Err(Status::PendingException)
        );
        assert_eq!(
            env.record(env.create_object()),
            Err(Status::PendingException)
        );
        let info = env.last_error_info();
        assert_eq!(info.error_code, Status::PendingException);
        assert_eq!(info.message(), Some("An exception is pending"));

        let error = env.get_and_clear_last_exception().unwrap();
        let message = env.get_named_property(error, "message").unwrap();
        assert_eq!(env.get_value_string_utf8(message).unwrap(), "left pending");

        env.record(env.create_object()).unwrap();
        assert_eq!(env.last_error_info().error_code, Status::Ok);
    });
}

#[test]
fn callback_error_on_pending_exception_keeps_original() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        install(env, "double_fault", |env, _info| {
            env.throw_error(None, "first")?;
            env.throw_error(None, "second")?;
            Ok(None)
        });
        let caught = eval_string(env, "try { double_fault() } catch (e) { e.message }");
        assert_eq!(caught, "first");
    });
}
