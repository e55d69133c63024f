//! Instance methods and fields of the receiver's type

use super::{Found, Request, Resolve, Target};
use crate::runtime::value::Value;
use crate::runtime::RuntimeResult;

pub(super) struct MethodStrategy;

impl Resolve for MethodStrategy {
    /// The nearest type in the receiver's hierarchy declaring a fitting
    /// method wins
    fn resolve(&self, request: &Request<'_>) -> RuntimeResult<Option<Found>> {
        if !request.is_method() {
            return Ok(None);
        }
        let Some(receiver_type) = request.receiver_type() else {
            return Ok(None);
        };
        for ty in request.registry.linearize(&receiver_type) {
            let Some(selected) = request.select(ty.methods_named(request.name())) else {
                continue;
            };
            let adapter = request.adapter(&selected.callable, 1)?;
            log::trace!("'{}' is a method of {}", request.name(), ty.name);
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

pub(super) struct FieldStrategy;

impl Resolve for FieldStrategy {
    /// `o.x()` reads and `o.x(v)` writes a public field, returning `o`
    fn resolve(&self, request: &Request<'_>) -> RuntimeResult<Option<Found>> {
        if !request.is_method() {
            return Ok(None);
        }
        let Some(Value::Object(object)) = request.receiver() else {
            return Ok(None);
        };
        let declared = request
            .registry
            .linearize(&object.class)
            .iter()
            .any(|ty| ty.public_field(request.name()).is_some());
        if !declared {
            return Ok(None);
        }
        let target = match request.args.len() {
            1 => Target::ReadField(request.name().to_string()),
            2 => Target::WriteField(request.name().to_string()),
            _ => return Ok(None),
        };
        Ok(Some(Found::exact(target)))
    }
}
