//! Adapting a call site's arguments to a resolved callable
//!
//! Three independent adjustments, applied in this order:
//!
//! 1. named arguments are permuted into declaration order
//! 2. trailing arguments are collected into an array for variadic targets,
//!    unless the call already passes exactly one array in that position
//! 3. caller-sensitive targets get the calling module's name prepended

use super::callable::Callable;
use super::value::Value;
use super::{RuntimeError, RuntimeResult};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Adapter {
    /// Arguments ahead of the nameable ones: receiver or bound captures
    leading: usize,
    /// Declaration index of each nameable argument, in call order
    permutation: Option<Vec<usize>>,
    /// Fixed parameter count of a variadic target
    varargs_fixed: Option<usize>,
    caller: Option<Arc<str>>,
}

impl Adapter {
    /// Adapter for calls passing `arity` arguments to `callable`
    ///
    /// `argument_names` is either empty or names every argument after the
    /// first `leading` ones.
    pub fn new(
        callable: &Callable,
        leading: usize,
        arity: usize,
        argument_names: &[String],
        caller_module: &str,
    ) -> RuntimeResult<Self> {
        let permutation = if argument_names.is_empty() {
            None
        } else {
            Some(Self::permutation(callable, leading, arity, argument_names)?)
        };
        Ok(Self {
            leading,
            permutation,
            varargs_fixed: callable.varargs.then(|| callable.params.len().saturating_sub(1)),
            caller: callable.caller_sensitive.then(|| Arc::from(caller_module)),
        })
    }

    fn permutation(
        callable: &Callable,
        leading: usize,
        arity: usize,
        argument_names: &[String],
    ) -> RuntimeResult<Vec<usize>> {
        let declared = callable.params.get(leading..).unwrap_or_default();
        if argument_names.len() != declared.len() || arity != leading + argument_names.len() {
            return Err(RuntimeError::ArityMismatch {
                target: callable.name.clone(),
                expected: callable.params.len(),
                actual: arity,
            });
        }
        let mut permutation = Vec::with_capacity(argument_names.len());
        for name in argument_names {
            let index = declared
                .iter()
                .position(|p| &p.name == name)
                .ok_or_else(|| RuntimeError::UnknownArgumentName {
                    argument: name.clone(),
                    target: callable.name.clone(),
                })?;
            if permutation.contains(&index) {
                return Err(RuntimeError::DuplicateArgumentName {
                    argument: name.clone(),
                    target: callable.name.clone(),
                });
            }
            permutation.push(index);
        }
        Ok(permutation)
    }

    /// Whether arguments reach the target unchanged
    pub fn is_identity(&self) -> bool {
        self.permutation.is_none() && self.varargs_fixed.is_none() && self.caller.is_none()
    }

    pub fn apply(&self, args: &[Value]) -> Vec<Value> {
        let mut adapted = match &self.permutation {
            None => args.to_vec(),
            Some(permutation) => {
                let mut out = args.to_vec();
                for (position, &declared) in permutation.iter().enumerate() {
                    if let (Some(slot), Some(value)) =
                        (out.get_mut(self.leading + declared), args.get(self.leading + position))
                    {
                        *slot = value.clone();
                    }
                }
                out
            }
        };
        if let Some(fixed) = self.varargs_fixed {
            let passes_array = adapted.len() == fixed + 1 && matches!(adapted.last(), Some(Value::Array(_)));
            if !passes_array {
                let rest = adapted.split_off(fixed.min(adapted.len()));
                adapted.push(Value::array(rest));
            }
        }
        if let Some(caller) = &self.caller {
            adapted.insert(0, Value::Str(Arc::clone(caller)));
        }
        adapted
    }
}
