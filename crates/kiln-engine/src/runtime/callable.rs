//! Invocable targets

use super::registry::Registry;
use super::value::Value;
use super::RuntimeResult;
use std::fmt;
use std::sync::Arc;

/// Native implementation of a callable
pub type NativeBody = Arc<dyn Fn(&[Value]) -> RuntimeResult<Value> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    /// Module-level function or augmentation function
    Function,
    /// Instance method; the receiver is the first parameter
    Method,
    Constructor,
}

/// Declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    /// Accepted type; any value when `None`
    pub ty: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
        }
    }

    pub fn typed(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty.into()),
        }
    }
}

pub struct Callable {
    pub name: String,
    pub params: Vec<Param>,
    /// The last parameter collects trailing arguments into an array
    pub varargs: bool,
    /// Receives the calling module's name ahead of its declared parameters
    pub caller_sensitive: bool,
    pub kind: CallableKind,
    body: NativeBody,
}

impl Callable {
    pub fn new<F>(name: impl Into<String>, params: &[&str], body: F) -> Self
    where
        F: Fn(&[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: params.iter().map(|p| Param::new(*p)).collect(),
            varargs: false,
            caller_sensitive: false,
            kind: CallableKind::Function,
            body: Arc::new(body),
        }
    }

    /// Method whose first parameter is the receiver
    pub fn method<F>(name: impl Into<String>, params: &[&str], body: F) -> Self
    where
        F: Fn(&[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        let mut receiver_first = vec!["this"];
        receiver_first.extend_from_slice(params);
        let mut callable = Self::new(name, &receiver_first, body);
        callable.kind = CallableKind::Method;
        callable
    }

    pub fn constructor<F>(name: impl Into<String>, params: &[&str], body: F) -> Self
    where
        F: Fn(&[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        let mut callable = Self::new(name, params, body);
        callable.kind = CallableKind::Constructor;
        callable
    }

    pub fn variadic(mut self) -> Self {
        self.varargs = true;
        self
    }

    pub fn caller_sensitive(mut self) -> Self {
        self.caller_sensitive = true;
        self
    }

    /// Restrict the parameter at `index` to values assignable to `ty`
    pub fn typed(mut self, index: usize, ty: impl Into<String>) -> Self {
        if let Some(param) = self.params.get_mut(index) {
            param.ty = Some(ty.into());
        }
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether a call with `arity` arguments can be adapted to this callable
    pub fn accepts(&self, arity: usize) -> bool {
        if self.varargs {
            arity + 1 >= self.params.len()
        } else {
            arity == self.params.len()
        }
    }

    /// Whether every fixed argument is assignable to its parameter type
    ///
    /// Null is accepted by any parameter.
    pub fn applicable(&self, registry: &Registry, args: &[Value]) -> bool {
        if !self.accepts(args.len()) {
            return false;
        }
        let fixed = if self.varargs { self.params.len().saturating_sub(1) } else { self.params.len() };
        self.params[..fixed].iter().zip(args).all(|(param, arg)| match &param.ty {
            None => true,
            Some(_) if arg.is_null() => true,
            Some(ty) => registry.is_assignable(arg.type_name(), ty),
        })
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Run the body on already adapted arguments
    pub fn call(&self, args: &[Value]) -> RuntimeResult<Value> {
        (self.body)(args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("varargs", &self.varargs)
            .field("kind", &self.kind)
            .finish()
    }
}
