use std::ptr;

use otter_napi::{BigintWords, Env, Runtime, TypedArrayType, ValueType};
use serde_json::json;

fn global(env: &Env, name: &str) -> otter_napi::Value {
    let global = env.get_global().unwrap();
    env.get_named_property(global, name).unwrap()
}

#[test]
fn type_of_matches_script_values() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        let external = env
            .create_external(ptr::null_mut(), None, ptr::null_mut())
            .unwrap();
        let array = env
            .run_script_str(
                "[undefined, null, true, 1.5, 'text', Symbol('s'), {}, () => 0, 10n]",
                "<test>",
            )
            .unwrap();
        let expected = [
            ValueType::Undefined,
            ValueType::Null,
            ValueType::Boolean,
            ValueType::Number,
            ValueType::String,
            ValueType::Symbol,
            ValueType::Object,
            ValueType::Function,
            ValueType::Bigint,
        ];
        for (index, kind) in expected.into_iter().enumerate() {
            let element = env.get_element(array, index as u32).unwrap();
            assert_eq!(env.type_of(element).unwrap(), kind, "element {index}");
        }
        assert_eq!(env.type_of(external).unwrap(), ValueType::External);
    });
}

#[test]
fn typed_array_info_shares_script_buffer() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        env.run_script_str(
            "globalThis.buf = new ArrayBuffer(8);\
             globalThis.view = new Uint16Array(buf, 2, 3);\
             globalThis.dv = new DataView(buf, 4);",
            "<test>",
        )
        .unwrap();

        let info = env.get_typedarray_info(global(env, "view")).unwrap();
        assert_eq!(info.kind, TypedArrayType::Uint16);
        assert_eq!(info.length, 3);
        assert_eq!(info.byte_offset, 2);
        let (base, length) = env.get_arraybuffer_info(info.arraybuffer).unwrap();
        assert_eq!(length, 8);
        assert_eq!(info.data, base.wrapping_add(2));
        assert!(env.strict_equals(info.arraybuffer, global(env, "buf")).unwrap());

        // SAFETY: the buffer is 8 bytes and stays reachable from the global object
        unsafe { info.data.cast::<u16>().write_unaligned(0x0102) };
        let seen = env.run_script_str("view[0]", "<test>").unwrap();
        assert_eq!(env.get_value_uint32(seen).unwrap(), 0x0102);

        let dv = env.get_dataview_info(global(env, "dv")).unwrap();
        assert_eq!((dv.byte_offset, dv.byte_length), (4, 4));
        assert_eq!(dv.data, base.wrapping_add(4));
        assert!(!env.is_typedarray(global(env, "dv")).unwrap());
        assert!(!env.is_dataview(global(env, "view")).unwrap());
    });
}

#[test]
fn json_bridge_through_native_function() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        let tally = env
            .create_function("tally", ptr::null_mut(), |env, info| {
                let mut order = env.to_json(info.arg(0).ok_or(otter_napi::Status::InvalidArg)?)?;
                let total: f64 = order["items"]
                    .as_array()
                    .map(|items| items.iter().filter_map(|item| item["price"].as_f64()).sum())
                    .unwrap_or_default();
                order["total"] = json!(total);
                env.from_json(&order).map(Some)
            })
            .unwrap();
        let global_object = env.get_global().unwrap();
        env.set_named_property(global_object, "tally", tally).unwrap();

        let result = env
            .run_script_str(
                "const order = tally({ id: 'a1', items: [{ price: 2.5 }, { price: 4 }], skip: undefined });\
                 order",
                "<test>",
            )
            .unwrap();
        assert_eq!(
            env.to_json(result).unwrap(),
            json!({ "id": "a1", "items": [{ "price": 2.5 }, { "price": 4 }], "total": 6.5 })
        );
    });
}

#[test]
fn bigint_words_from_script() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        let big = env.run_script_str("-(2n ** 64n + 5n)", "<test>").unwrap();
        assert_eq!(
            env.get_value_bigint_words(big).unwrap(),
            BigintWords {
                negative: true,
                words: vec![5, 1],
            }
        );
        let (_, lossless) = env.get_value_bigint_int64(big).unwrap();
        assert!(!lossless);

        let built = env.create_bigint_words(false, &[0, 0, 1]).unwrap();
        let global_object = env.get_global().unwrap();
        env.set_named_property(global_object, "built", built).unwrap();
        let matches = env.run_script_str("built === 2n ** 128n", "<test>").unwrap();
        assert!(env.get_value_bool(matches).unwrap());
    });
}

#[test]
fn strings_cross_encodings() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        let latin1 = env.create_string_latin1(&[b'c', 0xe9]).unwrap();
        assert_eq!(env.get_value_string_utf8(latin1).unwrap(), "cé");

        let units: Vec<u16> = "a😀".encode_utf16().collect();
        let utf16 = env.create_string_utf16(&units).unwrap();
        let global_object = env.get_global().unwrap();
        env.set_named_property(global_object, "s", utf16).unwrap();
        let length = env.run_script_str("s.length", "<test>").unwrap();
        assert_eq!(env.get_value_int32(length).unwrap(), 3);
        assert_eq!(env.get_value_string_utf16(utf16).unwrap(), units);

        let a = env.symbol_for("shared").unwrap();
        let b = env.run_script_str("Symbol.for('shared')", "<test>").unwrap();
        assert!(env.strict_equals(a, b).unwrap());
    });
}
