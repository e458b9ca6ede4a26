//! Benchmarking collaborator.
//!
//! Declared with the class runtime rather than beside it: `Benchmark` is a
//! mixin module whose capabilities (`measure`, `mean`, `stddev`, `average`,
//! `format`) are extended onto a class, the way the runtime's own consumers
//! are built. The core never depends on this module; it only consumes the
//! public dispatch surface plus a wall clock.

use instant::Instant;

use crate::error::{RtErrorKind, RtResult, err};
use crate::rt::module_def::{Module, ModuleBuilder};
use crate::rt::{Class, Runtime, send};
use crate::sequence::to_sequence;
use crate::value::Value;

/// Build the `Benchmark` mixin. `N` is the batch count: `measure` runs the
/// test `runs * N` times across `N` timed batches.
pub fn benchmark_module(rt: &Runtime) -> Module {
    ModuleBuilder::named("Benchmark")
        .class_attr("N", Value::Int(5))
        .class_method("mean", |_, args| {
            let values = numbers(args.first())?;
            if values.is_empty() {
                return Ok(Value::Float(0.0));
            }
            Ok(Value::Float(values.iter().sum::<f64>() / values.len() as f64))
        })
        .class_method("stddev", |recv, args| {
            let list = args.first().cloned().unwrap_or(Value::None);
            let squares = Value::list(
                numbers(Some(&list))?
                    .into_iter()
                    .map(|x| Value::Float(x * x))
                    .collect(),
            );
            let mean_sq = number(&send(recv, "mean", &[squares])?)?;
            let mean = number(&send(recv, "mean", &[list])?)?;
            Ok(Value::Float((mean_sq - mean * mean).max(0.0).sqrt()))
        })
        .class_method("average", |recv, args| {
            let list = args.first().cloned().unwrap_or(Value::None);
            let value = send(recv, "mean", &[list.clone()])?;
            let error = send(recv, "stddev", &[list])?;
            Ok(Value::list(vec![value, error]))
        })
        .class_method("format", |_, args| {
            let pair = to_sequence(args.first().unwrap_or(&Value::None))?;
            let value = number(pair.first().unwrap_or(&Value::Float(0.0)))?;
            let error = number(pair.get(1).unwrap_or(&Value::Float(0.0)))?;
            let pct = if value == 0.0 { 0.0 } else { 100.0 * error / value };
            Ok(Value::str(format!(
                "{}ms \u{00B1} {}%",
                value.round() as i64,
                pct.round() as i64
            )))
        })
        .class_method("measure", |recv, args| {
            let name = match args.first() {
                Some(Value::Str(s)) => s.to_string(),
                _ => {
                    return Err(err(
                        RtErrorKind::TypeError("str"),
                        "measure() takes a benchmark name".to_string(),
                    ));
                }
            };
            let runs = match args.get(1) {
                Some(Value::Int(n)) if *n > 0 => *n as usize,
                _ => {
                    return Err(err(
                        RtErrorKind::TypeError("int"),
                        "measure() takes a positive run count".to_string(),
                    ));
                }
            };
            let setup = match args.get(2) {
                Some(Value::Function(f)) => Some(f.clone()),
                Some(Value::None) | None => None,
                Some(other) => {
                    return Err(err(
                        RtErrorKind::TypeError("function"),
                        format!("measure() setup must be callable, got {}", other.type_name()),
                    ));
                }
            };
            let test = match args.get(3) {
                Some(Value::Function(f)) => f.clone(),
                _ => {
                    return Err(err(
                        RtErrorKind::TypeError("function"),
                        "measure() takes a test callable".to_string(),
                    ));
                }
            };
            let klass = match recv {
                Value::Class(k) => k.clone(),
                other => {
                    return Err(err(
                        RtErrorKind::TypeError("class"),
                        format!("measure() dispatched on {}", other.type_name()),
                    ));
                }
            };
            let batches = match klass.get("N") {
                Some(Value::Int(n)) if n > 0 => n as usize,
                _ => 5,
            };

            // One fresh environment per test invocation, all set up before
            // any timing starts.
            let rt = klass.runtime().clone();
            let env_class = rt.create_class(None, &[]);
            let mut envs = Vec::with_capacity(runs * batches);
            for _ in 0..runs * batches {
                let env = env_class.new_instance(&[])?;
                if let Some(setup) = &setup {
                    setup.call(&[Value::Instance(env.clone())])?;
                }
                envs.push(env);
            }

            let mut times = Vec::with_capacity(batches);
            for _ in 0..batches {
                let start = Instant::now();
                for _ in 0..runs {
                    if let Some(env) = envs.pop() {
                        test.call(&[Value::Instance(env)])?;
                    }
                }
                times.push(Value::Float(start.elapsed().as_secs_f64() * 1000.0));
            }

            let average = send(recv, "average", &[Value::list(times)])?;
            let formatted = send(recv, "format", &[average])?;
            match formatted {
                Value::Str(s) => Ok(Value::str(format!("{s} {name}"))),
                other => Ok(other),
            }
        })
        .build(rt)
}

/// The module extended onto a fresh class, so the capabilities are
/// class-level and ready to call.
pub fn benchmark_class(rt: &Runtime) -> Class {
    let module = benchmark_module(rt);
    let klass = rt.create_class(None, &[]).named("Benchmark");
    klass.extend(&module);
    klass
}

fn number(v: &Value) -> RtResult<f64> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(err(
            RtErrorKind::TypeError("number"),
            format!("expected a number, got {}", other.type_name()),
        )),
    }
}

fn numbers(v: Option<&Value>) -> RtResult<Vec<f64>> {
    to_sequence(v.unwrap_or(&Value::None))?.iter().map(number).collect()
}
