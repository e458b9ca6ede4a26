//! Runtime unit tests: class creation, inheritance, super dispatch,
//! class-method propagation, and module composition.

use super::*;
use crate::rt::module_def::ModuleBuilder;
use crate::value::Callable;

fn str_of(v: Value) -> String {
    match v {
        Value::Str(s) => s.to_string(),
        other => panic!("expected string, got {other:?}"),
    }
}

// ========== definition & overwrite semantics ==========

#[test]
fn test_first_definition_wins_with_overwrite_false() {
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]);
    klass.define(
        "m",
        Contribution::Method(MethodBody::plain(|_, _| Ok(Value::Int(1)))),
        false,
    );
    klass.define(
        "m",
        Contribution::Method(MethodBody::plain(|_, _| Ok(Value::Int(2)))),
        false,
    );
    let dispatch = klass.resolve_method("m").expect("method defined");
    let inst = klass.new_instance(&[]).unwrap();
    assert_eq!(dispatch.call(&Value::Instance(inst), &[]).unwrap(), Value::Int(1));
}

#[test]
fn test_user_methods_override_seeded_baseline() {
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]);
    klass.method("initialize", |recv, _| {
        expect_instance(recv)?.set("marked", Value::Bool(true));
        Ok(Value::None)
    });
    let inst = klass.new_instance(&[]).unwrap();
    assert_eq!(inst.get("marked"), Some(Value::Bool(true)));
}

#[test]
fn test_missing_method_and_not_callable() {
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]);
    klass.attr("limit", Value::Int(3));
    let inst = klass.new_instance(&[]).unwrap();

    let missing = inst.call("nope", &[]);
    assert!(matches!(missing.unwrap_err().kind, RtErrorKind::MissingMethod));

    let not_callable = inst.call("limit", &[]);
    assert!(matches!(not_callable.unwrap_err().kind, RtErrorKind::NotCallable));
}

// ========== construction protocol ==========

#[test]
fn test_construction_is_single_shot() {
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]);
    klass.method("initialize", |recv, args| {
        let inst = expect_instance(recv)?;
        inst.set("n", args.first().cloned().unwrap_or(Value::None));
        Ok(Value::None)
    });
    klass.method("value", |recv, _| {
        match expect_instance(recv)?.get("n") {
            Some(Value::Int(n)) => Ok(Value::Int(n * 2)),
            _ => Ok(Value::None),
        }
    });

    let inst = klass.new_instance(&[Value::Int(5)]).unwrap();
    assert_eq!(inst.call("value", &[]).unwrap(), Value::Int(10));

    // A second explicit constructor invocation has no effect.
    inst.construct(&[Value::Int(99)]).unwrap();
    assert_eq!(inst.call("value", &[]).unwrap(), Value::Int(10));
}

#[test]
fn test_forwarding_initializer_does_not_reconstruct() {
    let rt = Runtime::new();
    let base = rt.create_class(None, &[]);
    base.method("initialize", |recv, args| {
        expect_instance(recv)?.set("base_arg", args.first().cloned().unwrap_or(Value::None));
        Ok(Value::None)
    });
    let sub = rt.create_class(Some(&base), &[]);
    sub.chained("initialize", |recv, _, sup| {
        sup.call(&[])?;
        expect_instance(recv)?.set("sub_init", Value::Bool(true));
        Ok(Value::None)
    });

    let inst = sub.new_instance(&[Value::Int(7)]).unwrap();
    assert_eq!(inst.get("base_arg"), Some(Value::Int(7)));
    assert_eq!(inst.get("sub_init"), Some(Value::Bool(true)));
}

// ========== super dispatch ==========

#[test]
fn test_three_level_super_chain() {
    let rt = Runtime::new();
    let a = rt.create_class(None, &[]).named("A");
    a.method("greet", |_, _| Ok(Value::str("A")));

    let b = rt.create_class(Some(&a), &[]).named("B");
    b.chained("greet", |_, _, sup| {
        Ok(Value::str(format!("B:{}", str_of(sup.call(&[])?))))
    });

    let c = rt.create_class(Some(&b), &[]).named("C");
    c.chained("greet", |_, _, sup| {
        Ok(Value::str(format!("C:{}", str_of(sup.call(&[])?))))
    });

    let inst = c.new_instance(&[]).unwrap();
    assert_eq!(inst.call("greet", &[]).unwrap(), Value::str("C:B:A"));
}

#[test]
fn test_sequential_super_calls_reach_same_ancestor() {
    let rt = Runtime::new();
    let a = rt.create_class(None, &[]);
    a.method("bump", |recv, _| {
        let inst = expect_instance(recv)?;
        let n = match inst.get("count") {
            Some(Value::Int(n)) => n,
            _ => 0,
        };
        inst.set("count", Value::Int(n + 1));
        Ok(Value::Int(n + 1))
    });

    let b = rt.create_class(Some(&a), &[]);
    b.chained("bump", |_, _, sup| {
        sup.call(&[])?;
        sup.call(&[])
    });

    let inst = b.new_instance(&[]).unwrap();
    assert_eq!(inst.call("bump", &[]).unwrap(), Value::Int(2));
    // No transient super state survives on the receiver.
    assert_eq!(inst.get("count"), Some(Value::Int(2)));
}

#[test]
fn test_super_skips_to_defining_ancestor() {
    // B defines nothing; C's super snapshot resolves through B up to A.
    let rt = Runtime::new();
    let a = rt.create_class(None, &[]);
    a.method("greet", |_, _| Ok(Value::str("A")));
    let b = rt.create_class(Some(&a), &[]);
    let c = rt.create_class(Some(&b), &[]);
    c.chained("greet", |_, _, sup| {
        Ok(Value::str(format!("C:{}", str_of(sup.call(&[])?))))
    });

    let inst = c.new_instance(&[]).unwrap();
    assert_eq!(inst.call("greet", &[]).unwrap(), Value::str("C:A"));
}

#[test]
fn test_reentrant_method_with_super() {
    // A method that re-enters itself on the same receiver before returning:
    // each activation gets its own super capability.
    let rt = Runtime::new();
    let a = rt.create_class(None, &[]);
    a.method("depth", |_, args| Ok(args.first().cloned().unwrap_or(Value::Int(0))));
    let b = rt.create_class(Some(&a), &[]);
    b.chained("depth", |recv, args, sup| {
        let n = match args.first() {
            Some(Value::Int(n)) => *n,
            _ => 0,
        };
        if n > 0 {
            let inst = expect_instance(recv)?;
            inst.call("depth", &[Value::Int(n - 1)])?;
        }
        sup.call(&[])
    });

    let inst = b.new_instance(&[]).unwrap();
    assert_eq!(inst.call("depth", &[Value::Int(2)]).unwrap(), Value::Int(2));
}

// ========== class methods & propagation ==========

#[test]
fn test_class_method_reaches_existing_non_overriding_subclass() {
    let rt = Runtime::new();
    let a = rt.create_class(None, &[]).named("A");
    let b = rt.create_class(Some(&a), &[]).named("B");
    let c = rt.create_class(Some(&a), &[]).named("C");

    b.class_method("cap", |_, _| Ok(Value::str("B's own")));
    a.class_method("cap", |_, _| Ok(Value::str("from A")));

    // B overrode the name: the ancestor's later declaration must not clobber.
    assert_eq!(b.call("cap", &[]).unwrap(), Value::str("B's own"));
    // C never defined it and gains the new capability immediately.
    assert_eq!(c.call("cap", &[]).unwrap(), Value::str("from A"));
    assert_eq!(a.call("cap", &[]).unwrap(), Value::str("from A"));
}

#[test]
fn test_creation_copy_shields_subclass_from_redefinition() {
    // The documented quirk: a subclass created while the ancestor already had
    // the name carries the copy as its own entry, and later ancestor
    // redefinitions no longer reach it.
    let rt = Runtime::new();
    let a = rt.create_class(None, &[]);
    a.class_method("tag", |_, _| Ok(Value::str("old")));
    let b = rt.create_class(Some(&a), &[]);
    assert_eq!(b.call("tag", &[]).unwrap(), Value::str("old"));

    a.class_method("tag", |_, _| Ok(Value::str("new")));
    assert_eq!(a.call("tag", &[]).unwrap(), Value::str("new"));
    assert_eq!(b.call("tag", &[]).unwrap(), Value::str("old"));
}

#[test]
fn test_class_method_super_chains_to_parent() {
    let rt = Runtime::new();
    let a = rt.create_class(None, &[]);
    a.class_method("tag", |_, _| Ok(Value::str("A")));
    let b = rt.create_class(Some(&a), &[]);
    b.class_chained("tag", |_, _, sup| {
        Ok(Value::str(format!("B:{}", str_of(sup.call(&[])?))))
    });
    assert_eq!(b.call("tag", &[]).unwrap(), Value::str("B:A"));
    // The parent's own behavior is untouched.
    assert_eq!(a.call("tag", &[]).unwrap(), Value::str("A"));
}

#[test]
fn test_propagation_recurses_through_grandchildren() {
    let rt = Runtime::new();
    let a = rt.create_class(None, &[]);
    let b = rt.create_class(Some(&a), &[]);
    let c = rt.create_class(Some(&b), &[]);
    a.class_method("fresh", |_, _| Ok(Value::Int(1)));
    assert_eq!(c.call("fresh", &[]).unwrap(), Value::Int(1));
}

#[test]
fn test_class_attr_is_not_callable() {
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]);
    klass.class_attr("N", Value::Int(5));
    assert_eq!(klass.get("N"), Some(Value::Int(5)));
    assert!(matches!(
        klass.call("N", &[]).unwrap_err().kind,
        RtErrorKind::NotCallable
    ));
}

// ========== type query ==========

#[test]
fn test_is_a_over_ancestry() {
    let rt = Runtime::new();
    let a = rt.create_class(None, &[]);
    let b = rt.create_class(Some(&a), &[]);
    let c = rt.create_class(Some(&b), &[]);
    let unrelated = rt.create_class(None, &[]);

    let inst = b.new_instance(&[]).unwrap();
    assert!(inst.is_a(&b));
    assert!(inst.is_a(&a));
    assert!(!inst.is_a(&unrelated));
    // Never an instance of its own subclass.
    assert!(!inst.is_a(&c));
}

#[test]
fn test_seeded_is_a_accessor() {
    let rt = Runtime::new();
    let a = rt.create_class(None, &[]);
    let b = rt.create_class(Some(&a), &[]);
    let inst = b.new_instance(&[]).unwrap();
    assert_eq!(
        inst.call("isA", &[Value::Class(a.clone())]).unwrap(),
        Value::Bool(true)
    );
    let other = rt.create_class(None, &[]);
    assert_eq!(
        inst.call("isA", &[Value::Class(other)]).unwrap(),
        Value::Bool(false)
    );
}

// ========== bound methods ==========

#[test]
fn test_bound_method_carries_receiver() {
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]);
    klass.method("initialize", |recv, args| {
        expect_instance(recv)?.set("n", args.first().cloned().unwrap_or(Value::None));
        Ok(Value::None)
    });
    klass.method("n", |recv, _| {
        Ok(expect_instance(recv)?.get("n").unwrap_or(Value::None))
    });

    let five = klass.new_instance(&[Value::Int(5)]).unwrap();
    let nine = klass.new_instance(&[Value::Int(9)]).unwrap();
    let bound = five.method("n").unwrap();
    // The callable stays bound to its receiver even when another instance is
    // in play.
    assert_eq!(nine.call("n", &[]).unwrap(), Value::Int(9));
    assert_eq!(bound.call(&[]).unwrap(), Value::Int(5));
}

#[test]
fn test_seeded_method_accessor_returns_bound_callable() {
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]);
    klass.method("hello", |_, _| Ok(Value::str("hi")));
    let inst = klass.new_instance(&[]).unwrap();
    let bound = inst.call("method", &[Value::str("hello")]).unwrap();
    match bound {
        Value::Function(f) => assert_eq!(f.call(&[]).unwrap(), Value::str("hi")),
        other => panic!("expected bound callable, got {other:?}"),
    }
}

// ========== module composition ==========

#[test]
fn test_include_applies_contributions_in_order() {
    let rt = Runtime::new();
    let module = ModuleBuilder::named("M")
        .method("x", |_, _| Ok(Value::Int(1)))
        .method("x", |_, _| Ok(Value::Int(2)))
        .build(&rt);
    let klass = rt.create_class(None, &[&module]);
    let inst = klass.new_instance(&[]).unwrap();
    assert_eq!(inst.call("x", &[]).unwrap(), Value::Int(2));
}

#[test]
fn test_nested_include_loses_to_direct_contribution() {
    let rt = Runtime::new();
    let defaults = ModuleBuilder::named("Defaults")
        .method("x", |_, _| Ok(Value::str("default")))
        .method("y", |_, _| Ok(Value::str("default-y")))
        .build(&rt);
    let outer = ModuleBuilder::named("Outer")
        .include(&defaults)
        .method("x", |_, _| Ok(Value::str("direct")))
        .build(&rt);

    let klass = rt.create_class(None, &[&outer]);
    let inst = klass.new_instance(&[]).unwrap();
    assert_eq!(inst.call("x", &[]).unwrap(), Value::str("direct"));
    // Defaults without a direct counterpart survive.
    assert_eq!(inst.call("y", &[]).unwrap(), Value::str("default-y"));
}

#[test]
fn test_nested_extend_lands_on_class_table() {
    let rt = Runtime::new();
    let class_side = ModuleBuilder::named("ClassSide")
        .class_method("kind", |_, _| Ok(Value::str("mixed-in")))
        .build(&rt);
    let module = ModuleBuilder::named("M").extend(&class_side).build(&rt);

    let klass = rt.create_class(None, &[&module]);
    assert_eq!(klass.call("kind", &[]).unwrap(), Value::str("mixed-in"));
}

#[test]
fn test_include_with_overwrite_false_preserves_existing() {
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]);
    klass.method("x", |_, _| Ok(Value::str("original")));
    let module = ModuleBuilder::named("M")
        .method("x", |_, _| Ok(Value::str("module")))
        .build(&rt);
    klass.include_with(&module, false);
    let inst = klass.new_instance(&[]).unwrap();
    assert_eq!(inst.call("x", &[]).unwrap(), Value::str("original"));
}

#[test]
fn test_module_chained_contribution_sees_superclass() {
    let rt = Runtime::new();
    let base = rt.create_class(None, &[]);
    base.method("greet", |_, _| Ok(Value::str("base")));
    let module = ModuleBuilder::named("Loud")
        .chained("greet", |_, _, sup| {
            Ok(Value::str(format!("{}!", str_of(sup.call(&[])?))))
        })
        .build(&rt);

    let sub = rt.create_class(Some(&base), &[&module]);
    let inst = sub.new_instance(&[]).unwrap();
    assert_eq!(inst.call("greet", &[]).unwrap(), Value::str("base!"));
}

#[test]
fn test_module_included_into_many_classes() {
    let rt = Runtime::new();
    let module = ModuleBuilder::named("Shared")
        .method("tag", |_, _| Ok(Value::str("shared")))
        .build(&rt);
    let a = rt.create_class(None, &[&module]);
    let b = rt.create_class(None, &[&module]);
    assert_eq!(
        a.new_instance(&[]).unwrap().call("tag", &[]).unwrap(),
        Value::str("shared")
    );
    assert_eq!(
        b.new_instance(&[]).unwrap().call("tag", &[]).unwrap(),
        Value::str("shared")
    );
}

#[test]
fn test_extend_from_class_takes_own_class_methods() {
    let rt = Runtime::new();
    let source = rt.create_class(None, &[]);
    source.class_method("helper", |_, _| Ok(Value::str("helped")));
    let target = rt.create_class(None, &[]);
    target.extend_class(&source);
    assert_eq!(target.call("helper", &[]).unwrap(), Value::str("helped"));
}

// ========== attributes ==========

#[test]
fn test_instance_attr_falls_back_to_class_chain() {
    let rt = Runtime::new();
    let base = rt.create_class(None, &[]);
    base.attr("limit", Value::Int(10));
    let sub = rt.create_class(Some(&base), &[]);
    let inst = sub.new_instance(&[]).unwrap();

    assert_eq!(inst.get("limit"), Some(Value::Int(10)));
    // An instance write shadows the class-level value for that instance only.
    inst.set("limit", Value::Int(3));
    assert_eq!(inst.get("limit"), Some(Value::Int(3)));
    let other = sub.new_instance(&[]).unwrap();
    assert_eq!(other.get("limit"), Some(Value::Int(10)));
}

// ========== uniform dispatch ==========

#[test]
fn test_send_dispatches_on_instances_and_classes() {
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]);
    klass.method("m", |_, _| Ok(Value::Int(1)));
    klass.class_method("cm", |_, _| Ok(Value::Int(2)));
    let inst = klass.new_instance(&[]).unwrap();

    assert_eq!(send(&Value::Instance(inst), "m", &[]).unwrap(), Value::Int(1));
    assert_eq!(send(&Value::Class(klass), "cm", &[]).unwrap(), Value::Int(2));
    assert!(send(&Value::Int(1), "m", &[]).is_err());
}

#[test]
fn test_class_method_receiver_is_the_class() {
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]).named("Widget");
    klass.class_method("whoami", |recv, _| match recv {
        Value::Class(k) => Ok(Value::str(k.display_name())),
        other => Ok(Value::str(other.type_name())),
    });
    assert_eq!(klass.call("whoami", &[]).unwrap(), Value::str("Widget"));
}

#[test]
fn test_defining_during_dispatch_does_not_deadlock() {
    // Method bodies run with no arena borrow held, so they can define new
    // classes and methods mid-call.
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]);
    let rt_inner = rt.clone();
    klass.method("expand", move |_, _| {
        let fresh = rt_inner.create_class(None, &[]);
        fresh.method("hello", |_, _| Ok(Value::str("hi")));
        let inst = fresh.new_instance(&[])?;
        inst.call("hello", &[])
    });
    let inst = klass.new_instance(&[]).unwrap();
    assert_eq!(inst.call("expand", &[]).unwrap(), Value::str("hi"));
}

#[test]
fn test_callable_value_round_trip() {
    let rt = Runtime::new();
    let klass = rt.create_class(None, &[]);
    klass.method("apply", |_, args| match args {
        [Value::Function(f), rest @ ..] => f.call(rest),
        _ => Ok(Value::None),
    });
    let inst = klass.new_instance(&[]).unwrap();
    let double = Callable::new(|args| match args.first() {
        Some(Value::Int(n)) => Ok(Value::Int(n * 2)),
        _ => Ok(Value::None),
    });
    let result = inst
        .call("apply", &[Value::Function(double), Value::Int(21)])
        .unwrap();
    assert_eq!(result, Value::Int(42));
}
