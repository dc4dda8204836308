use otter_napi::{Runtime, Status};

#[test]
fn escapable_scope_promotes_one_handle() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        let outer = env.open_escapable_handle_scope();
        let inner = env.open_escapable_handle_scope();
        let text = env.create_string_utf8("escaped").unwrap();
        let kept = env.escape_handle(&inner, text).unwrap();
        let again = env.create_int32(1).unwrap();
        assert_eq!(env.escape_handle(&inner, again), Err(Status::EscapeCalledTwice));
        env.close_escapable_handle_scope(inner).unwrap();

        assert_eq!(env.get_value_string_utf8(text), Err(Status::InvalidArg));
        assert_eq!(env.get_value_string_utf8(kept).unwrap(), "escaped");
        env.close_escapable_handle_scope(outer).unwrap();
        assert_eq!(env.get_value_string_utf8(kept), Err(Status::InvalidArg));
    });
}

#[test]
fn out_of_order_close_leaves_stack_intact() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    let outer = env.open_handle_scope();
    let inner = env.open_handle_scope();
    let value = env.create_int32(9).unwrap();

    assert_eq!(env.close_handle_scope(outer), Err(Status::HandleScopeEmpty));
    assert_eq!(env.handle_stats().open_scopes, 2);
    assert_eq!(env.get_value_int32(value).unwrap(), 9);

    env.close_handle_scope(inner).unwrap();
    env.close_handle_scope(outer).unwrap();
    assert_eq!(env.close_handle_scope(outer), Err(Status::HandleScopeEmpty));
    assert_eq!(env.handle_stats().open_scopes, 0);
}

#[test]
fn escapable_and_plain_tokens_are_not_interchangeable() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    let scope = env.open_escapable_handle_scope();
    let plain = otter_napi::HandleScope::from_bits(scope.to_bits());
    assert_eq!(env.close_handle_scope(plain), Err(Status::HandleScopeEmpty));
    env.close_escapable_handle_scope(scope).unwrap();
}

#[test]
fn callback_handles_do_not_leak_into_caller_scope() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        let noisy = env
            .create_function("noisy", std::ptr::null_mut(), |env, _info| {
                for i in 0..100 {
                    env.create_int32(i)?;
                }
                env.create_int32(-1).map(Some)
            })
            .unwrap();
        let global = env.get_global().unwrap();
        env.set_named_property(global, "noisy", noisy).unwrap();

        let before = env.handle_stats().live;
        let result = env
            .run_script_str("let total = 0; for (let i = 0; i < 50; i++) total += noisy(); total", "<test>")
            .unwrap();
        assert_eq!(env.get_value_int32(result).unwrap(), -50);
        assert_eq!(env.handle_stats().live, before + 1);
    });
}

#[test]
fn pool_stays_bounded_by_peak_usage() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    for round in 0..200 {
        env.scope(|env| {
            for i in 0..32 {
                env.create_double(f64::from(round * i)).unwrap();
            }
            env.scope(|env| {
                env.create_string_utf8("nested").unwrap();
            });
        });
    }

    let stats = env.handle_stats();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.open_scopes, 0);
    assert!(stats.pooled <= 33, "pool grew to {}", stats.pooled);
}

#[test]
fn teardown_releases_open_scopes() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();
    let _scope = env.open_handle_scope();
    let object = env.create_object().unwrap();
    env.set_named_property(object, "self", object).unwrap();
    assert_eq!(env.handle_stats().live, 1);
    drop(env);
}
