//! Drives the exported C surface the way a native addon would

#![cfg(target_pointer_width = "64")]

use std::ffi::{CStr, c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use otter_napi::Status;
use otter_napi::capi::*;
use serial_test::serial;

static FINALIZED: AtomicUsize = AtomicUsize::new(0);

struct TestEnv(napi_env);

impl TestEnv {
    fn new() -> Self {
        let mut env = ptr::null_mut();
        assert_eq!(unsafe { otter_napi_create_env(&mut env) }, Status::Ok);
        assert!(!env.is_null());
        Self(env)
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        assert_eq!(unsafe { otter_napi_free_env(self.0) }, Status::Ok);
    }
}

unsafe fn string(env: napi_env, text: &CStr) -> napi_value {
    let mut value = ptr::null_mut();
    let status = unsafe { napi_create_string_utf8(env, text.as_ptr(), NAPI_AUTO_LENGTH, &mut value) };
    assert_eq!(status, Status::Ok);
    value
}

unsafe fn run(env: napi_env, source: &CStr) -> napi_value {
    let mut result = ptr::null_mut();
    let status = unsafe { napi_run_script(env, string(env, source), &mut result) };
    assert_eq!(status, Status::Ok);
    result
}

unsafe fn install(env: napi_env, name: &CStr, cb: napi_callback) {
    unsafe {
        let mut function = ptr::null_mut();
        let status = napi_create_function(env, name.as_ptr(), NAPI_AUTO_LENGTH, cb, ptr::null_mut(), &mut function);
        assert_eq!(status, Status::Ok);
        let mut global = ptr::null_mut();
        assert_eq!(napi_get_global(env, &mut global), Status::Ok);
        assert_eq!(napi_set_named_property(env, global, name.as_ptr(), function), Status::Ok);
    }
}

unsafe extern "C" fn add(env: napi_env, info: napi_callback_info) -> napi_value {
    unsafe {
        let mut argc = 2usize;
        let mut argv = [ptr::null_mut(); 2];
        let status = napi_get_cb_info(env, info, &mut argc, argv.as_mut_ptr(), ptr::null_mut(), ptr::null_mut());
        if status != Status::Ok {
            return ptr::null_mut();
        }
        let (mut a, mut b) = (0.0, 0.0);
        if napi_get_value_double(env, argv[0], &mut a) != Status::Ok
            || napi_get_value_double(env, argv[1], &mut b) != Status::Ok
        {
            napi_throw_type_error(env, ptr::null(), c"add expects two numbers".as_ptr());
            return ptr::null_mut();
        }
        let mut sum = ptr::null_mut();
        napi_create_double(env, a + b, &mut sum);
        sum
    }
}

unsafe extern "C" fn count_finalize(_env: napi_env, data: *mut c_void, hint: *mut c_void) {
    assert_eq!(data as usize, 0xd0);
    assert_eq!(hint as usize, 0x41);
    FINALIZED.fetch_add(1, Ordering::SeqCst);
}

#[test]
#[serial]
fn string_round_trip_and_truncation() {
    let env = TestEnv::new();
    unsafe {
        let mut scope = ptr::null_mut();
        assert_eq!(napi_open_handle_scope(env.0, &mut scope), Status::Ok);

        let value = string(env.0, c"h\u{e9}llo");
        let mut length = 0usize;
        let status = napi_get_value_string_utf8(env.0, value, ptr::null_mut(), 0, &mut length);
        assert_eq!(status, Status::Ok);
        assert_eq!(length, 6);

        let mut buf = [0 as c_char; 16];
        let mut copied = 0usize;
        napi_get_value_string_utf8(env.0, value, buf.as_mut_ptr(), buf.len(), &mut copied);
        assert_eq!(copied, 6);
        assert_eq!(CStr::from_ptr(buf.as_ptr()).to_str().unwrap(), "h\u{e9}llo");

        // Three bytes leave room for "h" only: the next character is two bytes wide
        let mut small = [0x7f as c_char; 3];
        napi_get_value_string_utf8(env.0, value, small.as_mut_ptr(), small.len(), &mut copied);
        assert_eq!(copied, 1);
        assert_eq!(CStr::from_ptr(small.as_ptr()).to_bytes(), b"h");

        assert_eq!(napi_close_handle_scope(env.0, scope), Status::Ok);
    }
}

#[test]
#[serial]
fn last_error_info_describes_failed_call() {
    let env = TestEnv::new();
    unsafe {
        let mut scope = ptr::null_mut();
        napi_open_handle_scope(env.0, &mut scope);

        let text = string(env.0, c"not a number");
        let mut number = 0i32;
        assert_eq!(napi_get_value_int32(env.0, text, &mut number), Status::NumberExpected);

        let mut info: *const napi_extended_error_info = ptr::null();
        assert_eq!(napi_get_last_error_info(env.0, &mut info), Status::Ok);
        assert_eq!((*info).error_code, Status::NumberExpected);
        assert_eq!(
            CStr::from_ptr((*info).error_message).to_str().unwrap(),
            "A number was expected"
        );

        let mut undefined = ptr::null_mut();
        assert_eq!(napi_get_undefined(env.0, &mut undefined), Status::Ok);
        napi_get_last_error_info(env.0, &mut info);
        assert_eq!((*info).error_code, Status::Ok);

        assert_eq!(napi_get_undefined(env.0, ptr::null_mut()), Status::InvalidArg);
        napi_close_handle_scope(env.0, scope);
    }
}

#[test]
#[serial]
fn native_function_called_from_script() {
    let env = TestEnv::new();
    unsafe {
        let mut scope = ptr::null_mut();
        napi_open_handle_scope(env.0, &mut scope);
        install(env.0, c"add", Some(add));

        let mut sum = 0.0;
        let result = run(env.0, c"add(2, 3) + add(0.5, 0.25)");
        assert_eq!(napi_get_value_double(env.0, result, &mut sum), Status::Ok);
        assert_eq!(sum, 5.75);

        let message = run(
            env.0,
            c"try { add('x') } catch (e) { `${e instanceof TypeError}:${e.message}` }",
        );
        let mut buf = [0 as c_char; 64];
        napi_get_value_string_utf8(env.0, message, buf.as_mut_ptr(), buf.len(), ptr::null_mut());
        assert_eq!(
            CStr::from_ptr(buf.as_ptr()).to_str().unwrap(),
            "true:add expects two numbers"
        );

        let mut pending = true;
        napi_is_exception_pending(env.0, &mut pending);
        assert!(!pending);
        napi_close_handle_scope(env.0, scope);
    }
}

#[test]
#[serial]
fn wrap_finalizer_runs_after_collection() {
    FINALIZED.store(0, Ordering::SeqCst);
    let env = TestEnv::new();
    unsafe {
        let mut scope = ptr::null_mut();
        napi_open_handle_scope(env.0, &mut scope);
        let object = run(env.0, c"globalThis.wrapped = {}; wrapped");
        let status = napi_wrap(
            env.0,
            object,
            0xd0 as *mut c_void,
            Some(count_finalize),
            0x41 as *mut c_void,
            ptr::null_mut(),
        );
        assert_eq!(status, Status::Ok);

        let mut native = ptr::null_mut();
        assert_eq!(napi_unwrap(env.0, object, &mut native), Status::Ok);
        assert_eq!(native as usize, 0xd0);
        run(env.0, c"delete globalThis.wrapped");
        napi_close_handle_scope(env.0, scope);
    }

    assert_eq!(unsafe { otter_napi_run_gc(env.0) }, Status::Ok);
    assert_eq!(FINALIZED.load(Ordering::SeqCst), 1);
    drop(env);
    assert_eq!(FINALIZED.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn escapable_scope_pointers() {
    let env = TestEnv::new();
    unsafe {
        let mut outer = ptr::null_mut();
        napi_open_handle_scope(env.0, &mut outer);

        let mut scope = ptr::null_mut();
        assert_eq!(napi_open_escapable_handle_scope(env.0, &mut scope), Status::Ok);
        assert!(!scope.is_null());
        let inner = string(env.0, c"kept");
        let mut escaped = ptr::null_mut();
        assert_eq!(napi_escape_handle(env.0, scope, inner, &mut escaped), Status::Ok);
        assert_eq!(
            napi_escape_handle(env.0, scope, inner, &mut escaped),
            Status::EscapeCalledTwice
        );
        assert_eq!(napi_close_handle_scope(env.0, scope), Status::HandleScopeEmpty);
        assert_eq!(napi_close_escapable_handle_scope(env.0, scope), Status::Ok);

        let mut kind = napi_valuetype::Undefined;
        assert_eq!(napi_typeof(env.0, escaped, &mut kind), Status::Ok);
        assert_eq!(kind, napi_valuetype::String);
        assert_eq!(napi_typeof(env.0, inner, &mut kind), Status::InvalidArg);

        napi_close_handle_scope(env.0, outer);
    }
}

#[test]
#[serial]
fn own_named_property_and_uint64() {
    let env = TestEnv::new();
    unsafe {
        let mut scope = ptr::null_mut();
        napi_open_handle_scope(env.0, &mut scope);
        let object = run(env.0, c"Object.create({ inherited: 1 }, { own: { value: 2 } })");

        let mut has = false;
        assert_eq!(napi_has_own_named_property(env.0, object, c"own".as_ptr(), &mut has), Status::Ok);
        assert!(has);
        assert_eq!(
            napi_has_own_named_property(env.0, object, c"inherited".as_ptr(), &mut has),
            Status::Ok
        );
        assert!(!has);
        assert_eq!(napi_has_named_property(env.0, object, c"inherited".as_ptr(), &mut has), Status::Ok);
        assert!(has);
        assert_eq!(
            napi_has_own_named_property(env.0, string(env.0, c"text"), c"length".as_ptr(), &mut has),
            Status::ObjectExpected
        );

        let mut number = ptr::null_mut();
        let mut back = 0.0;
        assert_eq!(napi_create_uint64(env.0, 1 << 40, &mut number), Status::Ok);
        assert_eq!(napi_get_value_double(env.0, number, &mut back), Status::Ok);
        assert_eq!(back, (1u64 << 40) as f64);
        assert_eq!(napi_create_uint64(env.0, u64::MAX, &mut number), Status::Ok);
        assert_eq!(napi_get_value_double(env.0, number, &mut back), Status::Ok);
        assert_eq!(back, 18446744073709551616.0);

        assert_eq!(napi_free_cstring(env.0, ptr::null()), Status::Ok);
        assert_eq!(napi_free_cstring(ptr::null_mut(), ptr::null()), Status::InvalidArg);
        napi_close_handle_scope(env.0, scope);
    }
}

#[test]
#[serial]
fn run_microtasks_settles_promise_reactions() {
    let env = TestEnv::new();
    unsafe {
        let mut scope = ptr::null_mut();
        napi_open_handle_scope(env.0, &mut scope);
        let mut global = ptr::null_mut();
        napi_get_global(env.0, &mut global);

        let mut deferred = ptr::null_mut();
        let mut promise = ptr::null_mut();
        assert_eq!(napi_create_promise(env.0, &mut deferred, &mut promise), Status::Ok);
        napi_set_named_property(env.0, global, c"pending".as_ptr(), promise);
        run(env.0, c"globalThis.seen = false; pending.then(v => { seen = v })");

        let mut yes = ptr::null_mut();
        napi_get_boolean(env.0, true, &mut yes);
        assert_eq!(napi_resolve_deferred(env.0, deferred, yes), Status::Ok);

        let mut seen = ptr::null_mut();
        let mut flag = true;
        napi_get_named_property(env.0, global, c"seen".as_ptr(), &mut seen);
        napi_get_value_bool(env.0, seen, &mut flag);
        assert!(!flag);

        assert_eq!(napi_run_microtasks(env.0), Status::Ok);
        napi_get_named_property(env.0, global, c"seen".as_ptr(), &mut seen);
        napi_get_value_bool(env.0, seen, &mut flag);
        assert!(flag);
        napi_close_handle_scope(env.0, scope);
    }
}
