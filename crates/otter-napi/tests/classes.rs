use std::cell::Cell;
use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;

use otter_napi::{Env, PropertyAttributes, PropertyDescriptor, Runtime, Status, TypeTag, Value, callback};

struct Point {
    x: f64,
    y: f64,
}

/// Native `Point` class backed by a boxed struct; `drops` counts finalized instances
fn point_class(env: &Env, drops: Rc<Cell<u32>>) -> Value {
    let length = callback(|env, info| {
        let point = env.unwrap(info.this())? as *const Point;
        // SAFETY: the wrap keeps the box alive while the object is reachable
        let point = unsafe { &*point };
        env.create_double(point.x.hypot(point.y)).map(Some)
    });
    let get_x = callback(|env, info| {
        let point = env.unwrap(info.this())? as *const Point;
        env.create_double(unsafe { (*point).x }).map(Some)
    });
    let set_x = callback(|env, info| {
        let point = env.unwrap(info.this())? as *mut Point;
        let x = env.get_value_double(info.arg(0).ok_or(Status::InvalidArg)?)?;
        unsafe { (*point).x = x };
        Ok(None)
    });
    let origin = callback(|env, info| {
        let zero = env.create_double(0.0)?;
        env.new_instance(info.this(), &[zero, zero]).map(Some)
    });

    env.define_class(
        "Point",
        ptr::null_mut(),
        move |env, info| {
            let args = env.get_cb_info(info, 2)?;
            let point = Box::new(Point {
                x: env.get_value_double(args[0])?,
                y: env.get_value_double(args[1])?,
            });
            let drops = drops.clone();
            env.wrap(
                info.this(),
                Box::into_raw(point).cast::<c_void>(),
                Some(Box::new(move |_env: &Env, data: *mut c_void, _hint: *mut c_void| {
                    drop(unsafe { Box::from_raw(data.cast::<Point>()) });
                    drops.set(drops.get() + 1);
                })),
                ptr::null_mut(),
                false,
            )?;
            Ok(None)
        },
        &[
            PropertyDescriptor::method("length", length),
            PropertyDescriptor::accessor("x", Some(get_x), Some(set_x)),
            PropertyDescriptor::method("origin", origin)
                .with_attributes(PropertyAttributes::DEFAULT_METHOD | PropertyAttributes::STATIC),
        ],
    )
    .unwrap()
}

fn install_point(env: &Env, drops: Rc<Cell<u32>>) -> Value {
    let class = point_class(env, drops);
    let global = env.get_global().unwrap();
    env.set_named_property(global, "Point", class).unwrap();
    class
}

#[test]
fn native_class_methods_accessors_and_statics() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();
    let drops = Rc::new(Cell::new(0));

    env.scope(|env| {
        install_point(env, drops.clone());
        let result = env
            .run_script_str(
                "const p = new Point(3, 4);\
                 const before = p.length();\
                 p.x = 6;\
                 [before, p.x, p instanceof Point, Point.origin().length(), typeof Point.prototype.origin].join()",
                "<test>",
            )
            .unwrap();
        assert_eq!(
            env.get_value_string_utf8(result).unwrap(),
            "5,6,true,0,undefined"
        );
    });
}

#[test]
fn instances_are_finalized_once_unreachable() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();
    let drops = Rc::new(Cell::new(0));

    env.scope(|env| {
        install_point(env, drops.clone());
        env.run_script_str(
            "for (let i = 0; i < 10; i++) new Point(i, i);\
             globalThis.kept = new Point(1, 1);",
            "<test>",
        )
        .unwrap();
    });
    env.run_gc().unwrap();
    assert_eq!(drops.get(), 10);

    env.scope(|env| {
        env.run_script_str("kept = null", "<test>").unwrap();
    });
    env.run_gc().unwrap();
    assert_eq!(drops.get(), 11);
}

#[test]
fn script_subclass_reaches_native_constructor() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();
    let drops = Rc::new(Cell::new(0));

    env.scope(|env| {
        install_point(env, drops.clone());
        let result = env
            .run_script_str(
                "class Point3 extends Point {\
                   constructor(x, y, z) { super(x, y); this.z = z; }\
                   volume() { return this.length() * this.z; }\
                 }\
                 const q = new Point3(3, 4, 2);\
                 [q.volume(), q instanceof Point, q instanceof Point3].join()",
                "<test>",
            )
            .unwrap();
        assert_eq!(env.get_value_string_utf8(result).unwrap(), "10,true,true");
    });
}

#[test]
fn calling_class_without_new_throws() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();
    let drops = Rc::new(Cell::new(0));

    env.scope(|env| {
        let class = install_point(env, drops.clone());
        let result = env
            .run_script_str("try { Point(1, 2) } catch (e) { e instanceof TypeError }", "<test>")
            .unwrap();
        assert!(env.get_value_bool(result).unwrap());

        let one = env.create_double(1.0).unwrap();
        assert_eq!(
            env.call_function(None, class, &[one, one]),
            Err(Status::PendingException)
        );
        env.get_and_clear_last_exception().unwrap();
    });
}

#[test]
fn host_constructs_instances_directly() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();
    let drops = Rc::new(Cell::new(0));

    env.scope(|env| {
        let class = point_class(env, drops.clone());
        let six = env.create_double(6.0).unwrap();
        let eight = env.create_double(8.0).unwrap();
        let point = env.new_instance(class, &[six, eight]).unwrap();
        assert!(env.instanceof(point, class).unwrap());

        let length = env.get_named_property(point, "length").unwrap();
        let result = env.call_function(Some(point), length, &[]).unwrap();
        assert_eq!(env.get_value_double(result).unwrap(), 10.0);

        let plain = env.create_object().unwrap();
        assert_eq!(
            env.call_function(Some(plain), length, &[]),
            Err(Status::PendingException)
        );
        let error = env.get_and_clear_last_exception().unwrap();
        let message = env.get_named_property(error, "message").unwrap();
        assert_eq!(
            env.get_value_string_utf8(message).unwrap(),
            Status::InvalidArg.to_string()
        );
    });
    drop(env);
    assert_eq!(drops.get(), 1);
}

#[test]
fn two_classes_keep_separate_metadata() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        for (name, tag) in [("Left", 1usize), ("Right", 2)] {
            let class = env
                .define_class(
                    name,
                    tag as *mut c_void,
                    |env, info| {
                        let tag = env.create_int32(info.data() as i32)?;
                        env.set_named_property(info.this(), "tag", tag)?;
                        Ok(None)
                    },
                    &[],
                )
                .unwrap();
            let global = env.get_global().unwrap();
            env.set_named_property(global, name, class).unwrap();
        }
        let result = env
            .run_script_str(
                "[new Left().tag, new Right().tag, new Left() instanceof Right, Left.name].join()",
                "<test>",
            )
            .unwrap();
        assert_eq!(env.get_value_string_utf8(result).unwrap(), "1,2,false,Left");
    });
}

#[test]
fn proxy_and_target_wrap_independently() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();

    env.scope(|env| {
        let target = env.run_script_str("globalThis.target = {}; target", "<test>").unwrap();
        let proxy = env
            .run_script_str("globalThis.proxy = new Proxy(target, {}); proxy", "<test>")
            .unwrap();

        env.wrap(proxy, 1 as *mut c_void, None, ptr::null_mut(), false).unwrap();
        assert_eq!(env.unwrap(target), Err(Status::InvalidArg));
        env.wrap(target, 2 as *mut c_void, None, ptr::null_mut(), false).unwrap();
        assert_eq!(env.unwrap(proxy).unwrap() as usize, 1);
        assert_eq!(env.unwrap(target).unwrap() as usize, 2);

        assert_eq!(env.remove_wrap(proxy).unwrap() as usize, 1);
        assert_eq!(env.unwrap(target).unwrap() as usize, 2);
    });
}

#[test]
fn native_state_is_invisible_to_script() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();
    let tag = TypeTag { lower: 7, upper: 9 };

    env.scope(|env| {
        let object = env.run_script_str("globalThis.host = {}; host", "<test>").unwrap();
        env.wrap(object, 5 as *mut c_void, None, ptr::null_mut(), false).unwrap();
        env.type_tag_object(object, &tag).unwrap();

        let count = env
            .run_script_str(
                "for (const s of Object.getOwnPropertySymbols(host)) delete host[s];\
                 Reflect.ownKeys(host).length",
                "<test>",
            )
            .unwrap();
        assert_eq!(env.get_value_int32(count).unwrap(), 0);
        assert_eq!(env.unwrap(object).unwrap() as usize, 5);
        assert!(env.check_object_type_tag(object, &tag).unwrap());
    });
}

#[test]
fn frozen_objects_take_wraps_and_type_tags() {
    let runtime = Runtime::new().unwrap();
    let env = runtime.create_env().unwrap();
    let tag = TypeTag { lower: 1, upper: 0 };

    env.scope(|env| {
        let object = env.run_script_str("Object.freeze({})", "<test>").unwrap();
        env.wrap(object, 3 as *mut c_void, None, ptr::null_mut(), false).unwrap();
        env.type_tag_object(object, &tag).unwrap();
        assert_eq!(env.type_tag_object(object, &tag), Err(Status::InvalidArg));
        assert!(env.check_object_type_tag(object, &tag).unwrap());
        assert!(!env.check_object_type_tag(object, &TypeTag { lower: 1, upper: 1 }).unwrap());
        assert_eq!(env.unwrap(object).unwrap() as usize, 3);
        assert!(!env.is_exception_pending().unwrap());
    });
}
