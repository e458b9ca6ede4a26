//! classkit — a dynamic class and mixin runtime.
//!
//! Classes are declared at runtime: single inheritance, mixin modules,
//! overridable instance and class-level methods, and cooperative super
//! dispatch, all without compile-time type declarations.
//!
//! ```
//! use classkit::{Runtime, Value};
//!
//! let rt = Runtime::new();
//! let animal = rt.create_class(None, &[]).named("Animal");
//! animal.method("speak", |_, _| Ok(Value::str("...")));
//!
//! let dog = rt.create_class(Some(&animal), &[]).named("Dog");
//! dog.chained("speak", |_, _, sup| {
//!     let base = sup.call(&[])?;
//!     Ok(Value::str(format!("woof (not {base:?})")))
//! });
//!
//! let rex = dog.new_instance(&[]).unwrap();
//! assert!(rex.is_a(&animal));
//! rex.call("speak", &[]).unwrap();
//! ```

pub mod bench;
pub mod error;
pub mod rt;
pub mod sequence;
pub mod value;

pub use error::{RtError, RtErrorKind, RtResult, err};
pub use rt::instance::Instance;
pub use rt::method::{Contribution, Dispatch, MethodBody, SuperCall};
pub use rt::module_def::{Module, ModuleBuilder, ModuleId};
pub use rt::{Class, ClassId, Runtime, send};
pub use sequence::to_sequence;
pub use value::{Callable, Value};
