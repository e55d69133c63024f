//! Augmentation lookups
//!
//! An augmentation function takes the receiver as its first parameter and is
//! usable when the receiver's concrete type is assignable to the
//! augmentation's target.

use super::{Found, Request, Resolve, Target};
use crate::runtime::callable::Callable;
use crate::runtime::registry::{Application, RuntimeModule};
use crate::runtime::RuntimeResult;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Source {
    /// Augmentations declared in the calling module
    Local,
    /// Named augmentations of the calling module applied there
    Named,
    /// Named augmentations of other modules applied in the calling module
    ExternalNamed,
    /// Augmentations and applications of the calling module's imports
    Imported,
}

pub(super) struct AugmentationStrategy(pub(super) Source);

impl Resolve for AugmentationStrategy {
    fn resolve(&self, request: &Request<'_>) -> RuntimeResult<Option<Found>> {
        if !request.is_method() {
            return Ok(None);
        }
        let (Some(caller), Some(receiver)) = (request.caller(), request.receiver()) else {
            return Ok(None);
        };
        let type_name = receiver.type_name().to_string();
        let assignable = |target: &str| request.registry.is_assignable(&type_name, target);

        let candidates: Vec<Arc<Callable>> = match self.0 {
            Source::Local => direct(&caller, &assignable),
            Source::Named => applied(&caller, &assignable)
                .filter(|name| !name.contains('.'))
                .flat_map(|name| named(&caller, name))
                .collect(),
            Source::ExternalNamed => applied(&caller, &assignable)
                .filter_map(|name| name.rsplit_once('.'))
                .filter_map(|(module, name)| {
                    let module = request.registry.module(module)?;
                    Some(named(&module, name))
                })
                .flatten()
                .collect(),
            Source::Imported => caller
                .imports
                .iter()
                .filter_map(|import| request.registry.module(import))
                .flat_map(|module| {
                    let mut found = direct(&module, &assignable);
                    let local: Vec<_> = applied(&module, &assignable)
                        .filter(|name| !name.contains('.'))
                        .flat_map(|name| named(&module, name))
                        .collect();
                    found.extend(local);
                    found
                })
                .collect(),
        };

        let Some(selected) = request.select(candidates.iter().filter(|c| c.name == request.name())) else {
            return Ok(None);
        };
        let adapter = request.adapter(&selected.callable, 1)?;
        log::trace!(
            "'{}' on {} found by {:?} augmentation lookup",
            request.name(),
            type_name,
            self.0
        );
        Ok(Some(Found {
            target: Target::Invoke {
                callable: selected.callable,
                adapter,
            },
            overloaded: selected.overloaded,
        }))
    }
}

fn direct(module: &RuntimeModule, assignable: &dyn Fn(&str) -> bool) -> Vec<Arc<Callable>> {
    module
        .augmentations
        .iter()
        .filter(|a| assignable(&a.target))
        .flat_map(|a| a.functions.iter().cloned())
        .collect()
}

/// Names of augmentations applied by `module` to a target the receiver fits
fn applied<'m>(module: &'m RuntimeModule, assignable: &'m dyn Fn(&str) -> bool) -> impl Iterator<Item = &'m str> + 'm {
    module
        .applications
        .iter()
        .filter(move |a: &&Application| assignable(&a.target))
        .flat_map(|a| a.augmentations.iter().map(String::as_str))
}

fn named(module: &RuntimeModule, name: &str) -> Vec<Arc<Callable>> {
    module.named_augmentations.get(name).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::call_site::InvocationDescriptor;
    use crate::runtime::registry::Registry;
    use crate::runtime::value::{types, Value};

    fn tagged(name: &str, tag: &'static str) -> Callable {
        Callable::new(name, &["this"], move |_| Ok(Value::str(tag)))
    }

    fn resolve(registry: &Registry, source: Source, receiver: Value) -> Option<Value> {
        let descriptor = InvocationDescriptor::method("demo", "shout", 1);
        let args = [receiver];
        let request = Request {
            registry,
            descriptor: &descriptor,
            args: &args,
        };
        let found = AugmentationStrategy(source).resolve(&request).unwrap()?;
        Some(found.target.invoke(&args).unwrap())
    }

    #[test]
    fn test_local_augmentation_of_supertype() {
        let registry = Registry::new();
        registry.register_module(RuntimeModule::new("demo").augment(types::OBJECT, vec![tagged("shout", "local")]));
        assert_eq!(resolve(&registry, Source::Local, Value::Int(1)), Some(Value::str("local")));
        assert_eq!(resolve(&registry, Source::Named, Value::Int(1)), None);
    }

    #[test]
    fn test_named_augmentation_needs_matching_application() {
        let registry = Registry::new();
        registry.register_module(
            RuntimeModule::new("demo")
                .named_augmentation("Loud", vec![tagged("shout", "named")])
                .apply(types::STRING, &["Loud"]),
        );
        assert_eq!(resolve(&registry, Source::Named, Value::str("a")), Some(Value::str("named")));
        assert_eq!(resolve(&registry, Source::Named, Value::Int(1)), None);
    }

    #[test]
    fn test_external_named_augmentation() {
        let registry = Registry::new();
        registry.register_module(RuntimeModule::new("lib.text").named_augmentation("Loud", vec![tagged("shout", "external")]));
        registry.register_module(RuntimeModule::new("demo").apply(types::STRING, &["lib.text.Loud"]));
        assert_eq!(resolve(&registry, Source::Named, Value::str("a")), None);
        assert_eq!(
            resolve(&registry, Source::ExternalNamed, Value::str("a")),
            Some(Value::str("external"))
        );
    }

    #[test]
    fn test_imported_augmentations() {
        let registry = Registry::new();
        registry.register_module(
            RuntimeModule::new("lib.text")
                .augment(types::STRING, vec![tagged("shout", "imported")])
                .named_augmentation("Quiet", vec![tagged("whisper", "imported named")])
                .apply(types::STRING, &["Quiet"]),
        );
        registry.register_module(RuntimeModule::new("demo").import("lib.text"));
        assert_eq!(resolve(&registry, Source::Local, Value::str("a")), None);
        assert_eq!(resolve(&registry, Source::Imported, Value::str("a")), Some(Value::str("imported")));
    }
}
