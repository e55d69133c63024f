//! Calls through function values

use super::{Found, Request, Resolve, Target};
use crate::runtime::adapt::Adapter;
use crate::runtime::call_site::CallKind;
use crate::runtime::value::Value;
use crate::runtime::{RuntimeError, RuntimeResult};

/// Method name that calls a function value held by the receiver
const INVOKE: &str = "invoke";

pub(super) struct ReferenceStrategy;

impl Resolve for ReferenceStrategy {
    fn resolve(&self, request: &Request<'_>) -> RuntimeResult<Option<Found>> {
        let applies = match request.descriptor.kind {
            CallKind::Reference => true,
            CallKind::Method { .. } => {
                request.name() == INVOKE && matches!(request.receiver(), Some(Value::Function(_)))
            }
            CallKind::Function => false,
        };
        if !applies {
            return Ok(None);
        }
        let function = match request.receiver() {
            Some(Value::Function(function)) => function,
            Some(other) => {
                return Err(RuntimeError::NotCallable {
                    type_name: other.type_name().to_string(),
                })
            }
            None => return Ok(None),
        };

        let arity = function.bound.len() + request.args.len() - 1;
        if !function.callable.accepts(arity) {
            return Err(RuntimeError::ArityMismatch {
                target: function.callable.name.clone(),
                expected: function.free_arity(),
                actual: request.args.len() - 1,
            });
        }
        let adapter = Adapter::new(
            &function.callable,
            function.bound.len(),
            arity,
            &request.descriptor.argument_names,
            &request.descriptor.caller_module,
        )?;
        log::trace!("'{}' calls function value {:?}", request.name(), function);
        Ok(Some(Found::exact(Target::Reference { adapter })))
    }
}
