//! Synthetic accessors

use super::{Found, Request, Resolve, Target};
use crate::runtime::RuntimeResult;

pub(super) struct PropertyStrategy;

impl Resolve for PropertyStrategy {
    /// `o.x()` calls `o.getX()` or `o.isX()`; `o.x(v)` calls `o.setX(v)`
    /// and returns `o`
    fn resolve(&self, request: &Request<'_>) -> RuntimeResult<Option<Found>> {
        if !request.is_method() || request.name().is_empty() {
            return Ok(None);
        }
        let Some(receiver_type) = request.receiver_type() else {
            return Ok(None);
        };
        if !receiver_type.synthetic_accessors {
            return Ok(None);
        }
        let property = capitalize(request.name());
        let (accessors, fluent) = if request.args.len() == 1 {
            (vec![format!("get{}", property), format!("is{}", property)], false)
        } else {
            (vec![format!("set{}", property)], true)
        };

        for ty in request.registry.linearize(&receiver_type) {
            for accessor in &accessors {
                let Some(selected) = request.select(ty.methods_named(accessor)) else {
                    continue;
                };
                let adapter = request.adapter(&selected.callable, 1)?;
                log::trace!("'{}' uses accessor {}.{}", request.name(), ty.name, accessor);
                let callable = selected.callable;
                let target = if fluent {
                    Target::Fluent { callable, adapter }
                } else {
                    Target::Invoke { callable, adapter }
                };
                return Ok(Some(Found {
                    target,
                    overloaded: selected.overloaded,
                }));
            }
        }
        Ok(None)
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::call_site::InvocationDescriptor;
    use crate::runtime::callable::Callable;
    use crate::runtime::registry::{Registry, TypeInfo};
    use crate::runtime::value::{Object, Value};
    use std::sync::Arc;

    fn person(registry: &Registry, accessors: bool) -> Value {
        let mut ty = TypeInfo::new("demo.Person")
            .private_field("name")
            .method(Callable::method("getName", &[], |args| {
                Ok(args[0].as_object().and_then(|o| o.get("name")).unwrap_or(Value::Null))
            }))
            .method(Callable::method("setName", &["name"], |args| {
                if let Some(o) = args[0].as_object() {
                    o.set("name", args[1].clone());
                }
                Ok(Value::Null)
            }));
        if !accessors {
            ty = ty.without_synthetic_accessors();
        }
        Value::Object(Arc::new(Object::new(registry.register_type(ty))))
    }

    #[test]
    fn test_getter_and_fluent_setter() {
        let registry = Registry::new();
        let receiver = person(&registry, true);

        let set = InvocationDescriptor::method("demo", "name", 2);
        let args = [receiver.clone(), Value::str("Ada")];
        let request = Request {
            registry: &registry,
            descriptor: &set,
            args: &args,
        };
        let found = PropertyStrategy.resolve(&request).unwrap().unwrap();
        assert_eq!(found.target.invoke(&args).unwrap(), receiver);

        let get = InvocationDescriptor::method("demo", "name", 1);
        let args = [receiver];
        let request = Request {
            registry: &registry,
            descriptor: &get,
            args: &args,
        };
        let found = PropertyStrategy.resolve(&request).unwrap().unwrap();
        assert_eq!(found.target.invoke(&args).unwrap(), Value::str("Ada"));
    }

    #[test]
    fn test_types_can_opt_out() {
        let registry = Registry::new();
        let receiver = person(&registry, false);
        let get = InvocationDescriptor::method("demo", "name", 1);
        let args = [receiver];
        let request = Request {
            registry: &registry,
            descriptor: &get,
            args: &args,
        };
        assert!(PropertyStrategy.resolve(&request).unwrap().is_none());
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("name"), "Name");
        assert_eq!(capitalize("éclair"), "Éclair");
        assert_eq!(capitalize(""), "");
    }
}
