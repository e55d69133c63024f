//! Plain function calls: module functions, static fields and constructors

use super::{Found, Request, Resolve, Target};
use crate::runtime::call_site::CallKind;
use crate::runtime::registry::{RuntimeModule, TypeInfo};
use crate::runtime::RuntimeResult;
use std::sync::Arc;

/// Places a plain name can be declared, in lookup order
///
/// Each entry pairs a module name with the name to look for inside it:
/// the caller's own module, the module named by a qualifier, every import
/// whose last segment matches the qualifier's first one, then every import.
fn scopes(request: &Request<'_>) -> Vec<(String, String)> {
    let name = request.name();
    let caller = &request.descriptor.caller_module;
    let imports = request
        .caller()
        .map(|module| module.imports.clone())
        .unwrap_or_default();

    let mut scopes = vec![(caller.clone(), name.to_string())];
    if let Some((qualifier, simple)) = name.rsplit_once('.') {
        scopes.push((qualifier.to_string(), simple.to_string()));
        let (alias, rest) = match qualifier.split_once('.') {
            Some((alias, rest)) => (alias, Some(rest)),
            None => (qualifier, None),
        };
        for import in &imports {
            if import.rsplit('.').next() == Some(alias) {
                let module = match rest {
                    Some(rest) => format!("{}.{}", import, rest),
                    None => import.clone(),
                };
                scopes.push((module, simple.to_string()));
            }
        }
    }
    for import in &imports {
        scopes.push((import.clone(), name.to_string()));
    }
    scopes
}

fn modules(request: &Request<'_>) -> Vec<(Arc<RuntimeModule>, String)> {
    scopes(request)
        .into_iter()
        .filter_map(|(module, name)| Some((request.registry.module(&module)?, name)))
        .collect()
}

pub(super) struct FunctionStrategy;

impl Resolve for FunctionStrategy {
    fn resolve(&self, request: &Request<'_>) -> RuntimeResult<Option<Found>> {
        if request.descriptor.kind != CallKind::Function {
            return Ok(None);
        }
        for (module, name) in modules(request) {
            let Some(selected) = request.select(module.functions_named(&name)) else {
                continue;
            };
            let adapter = request.adapter(&selected.callable, 0)?;
            log::trace!("'{}' is function {}.{}", request.name(), module.name, name);
            return Ok(Some(Found {
                target: Target::Invoke {
                    callable: selected.callable,
                    adapter,
                },
                overloaded: selected.overloaded,
            }));
        }
        Ok(None)
    }
}

pub(super) struct StaticFieldStrategy;

impl Resolve for StaticFieldStrategy {
    fn resolve(&self, request: &Request<'_>) -> RuntimeResult<Option<Found>> {
        if request.descriptor.kind != CallKind::Function || !request.args.is_empty() {
            return Ok(None);
        }
        let value = modules(request).into_iter().find_map(|(module, name)| module.fields.get(&name).cloned());
        Ok(value.map(|value| Found::exact(Target::Static(value))))
    }
}

pub(super) struct ConstructorStrategy;

impl ConstructorStrategy {
    fn find_type(request: &Request<'_>) -> Option<Arc<TypeInfo>> {
        if let Some(ty) = request.registry.get_type(request.name()) {
            return Some(ty);
        }
        scopes(request)
            .into_iter()
            .find_map(|(module, name)| request.registry.get_type(&format!("{}.{}", module, name)))
    }
}

impl Resolve for ConstructorStrategy {
    /// Declared constructors first; a type without any can be built from
    /// one argument per field
    fn resolve(&self, request: &Request<'_>) -> RuntimeResult<Option<Found>> {
        if request.descriptor.kind != CallKind::Function {
            return Ok(None);
        }
        let Some(ty) = Self::find_type(request) else {
            return Ok(None);
        };
        if ty.constructors.is_empty() {
            if request.args.len() == ty.fields.len() && request.descriptor.argument_names.is_empty() {
                return Ok(Some(Found::exact(Target::Instantiate(ty))));
            }
            return Ok(None);
        }
        let Some(selected) = request.select(&ty.constructors) else {
            return Ok(None);
        };
        let adapter = request.adapter(&selected.callable, 0)?;
        log::trace!("'{}' constructs {}", request.name(), ty.name);
        Ok(Some(Found {
            target: Target::Invoke {
                callable: selected.callable,
                adapter,
            },
            overloaded: selected.overloaded,
        }))
    }
}
