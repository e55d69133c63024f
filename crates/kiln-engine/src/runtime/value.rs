//! Runtime values

use super::callable::Callable;
use super::registry::{Registry, TypeInfo};
use super::{RuntimeError, RuntimeResult};
use crate::compiler::ir::ConstValue;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Names of the built-in value types
pub mod types {
    pub const OBJECT: &str = "kiln.lang.Object";
    pub const NULL: &str = "kiln.lang.Null";
    pub const BOOL: &str = "kiln.lang.Boolean";
    pub const NUMBER: &str = "kiln.lang.Number";
    pub const INT: &str = "kiln.lang.Integer";
    pub const FLOAT: &str = "kiln.lang.Float";
    pub const STRING: &str = "kiln.lang.String";
    pub const CHAR: &str = "kiln.lang.Character";
    pub const ARRAY: &str = "kiln.lang.Array";
    pub const TUPLE: &str = "kiln.lang.Tuple";
    pub const FUNCTION: &str = "kiln.lang.FunctionReference";
    pub const TYPE: &str = "kiln.lang.Type";
}

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Char(char),
    /// Aggregate, also used to carry collected varargs
    Array(Arc<[Value]>),
    Tuple(Arc<[Value]>),
    Object(Arc<Object>),
    Function(FunctionRef),
    Type(Arc<TypeInfo>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(values.into())
    }

    pub fn tuple(values: Vec<Value>) -> Self {
        Value::Tuple(values.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<Object>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Qualified name of the value's concrete type
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => types::NULL,
            Value::Bool(_) => types::BOOL,
            Value::Int(_) => types::INT,
            Value::Float(_) => types::FLOAT,
            Value::Str(_) => types::STRING,
            Value::Char(_) => types::CHAR,
            Value::Array(_) => types::ARRAY,
            Value::Tuple(_) => types::TUPLE,
            Value::Object(object) => &object.class.name,
            Value::Function(_) => types::FUNCTION,
            Value::Type(_) => types::TYPE,
        }
    }

    /// Runtime value of a literal
    ///
    /// Class references are looked up in `registry`.
    pub fn from_constant(constant: &ConstValue, registry: &Registry) -> RuntimeResult<Self> {
        Ok(match constant {
            ConstValue::Null => Value::Null,
            ConstValue::Bool(b) => Value::Bool(*b),
            ConstValue::Int(i) => Value::Int(*i),
            ConstValue::Float(x) => Value::Float(*x),
            ConstValue::Str(s) => Value::str(s),
            ConstValue::Char(c) => Value::Char(*c),
            ConstValue::ClassRef(name) => Value::Type(
                registry
                    .get_type(name)
                    .ok_or_else(|| RuntimeError::failure(format!("unknown class {}", name)))?,
            ),
        })
    }
}

impl PartialEq for Value {
    /// Structural for primitives and aggregates, identity for objects,
    /// functions and types
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Array(a), Value::Array(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.same_target(b) && a.bound == b.bound,
            (Value::Type(a), Value::Type(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Object(object) => write!(f, "{}@{:p}", object.class.name, Arc::as_ptr(object)),
            Value::Function(function) => write!(f, "{:?}", function),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Char(c) => write!(f, "{}", c),
            Value::Array(values) => write_list(f, "[", values, "]"),
            Value::Tuple(values) => write_list(f, "tuple[", values, "]"),
            Value::Object(object) => write!(f, "{}", object.class.name),
            Value::Function(function) => write!(f, "{}", function.callable.name),
            Value::Type(ty) => write!(f, "{}.class", ty.name),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, open: &str, values: &[Value], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", value)?;
    }
    f.write_str(close)
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<Arc<Object>> for Value {
    fn from(object: Arc<Object>) -> Self {
        Value::Object(object)
    }
}

/// Instance of a user-defined type
pub struct Object {
    pub class: Arc<TypeInfo>,
    fields: RwLock<FxHashMap<String, Value>>,
}

impl Object {
    /// Instance with every declared field set to null
    pub fn new(class: Arc<TypeInfo>) -> Self {
        let fields = class
            .fields
            .iter()
            .map(|field| (field.name.clone(), Value::Null))
            .collect();
        Self {
            class,
            fields: RwLock::new(fields),
        }
    }

    pub fn with_fields(class: Arc<TypeInfo>, values: impl IntoIterator<Item = (String, Value)>) -> Self {
        let object = Self::new(class);
        object.fields.write().extend(values);
        object
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.fields.read().get(field).cloned()
    }

    pub fn set(&self, field: &str, value: Value) {
        self.fields.write().insert(field.to_string(), value);
    }
}

/// Function value: a callable partially applied to captured values
#[derive(Clone)]
pub struct FunctionRef {
    pub callable: Arc<Callable>,
    /// Leading arguments supplied on every call
    pub bound: Vec<Value>,
}

impl FunctionRef {
    pub fn new(callable: Arc<Callable>) -> Self {
        Self {
            callable,
            bound: Vec::new(),
        }
    }

    /// Closure over `captured`, filling the callable's leading parameters
    pub fn closure(callable: Arc<Callable>, captured: Vec<Value>) -> Self {
        Self {
            callable,
            bound: captured,
        }
    }

    pub fn same_target(&self, other: &FunctionRef) -> bool {
        Arc::ptr_eq(&self.callable, &other.callable)
    }

    /// Parameters left to supply at the call
    pub fn free_arity(&self) -> usize {
        self.callable.params.len().saturating_sub(self.bound.len())
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^{}", self.callable.name)?;
        if !self.bound.is_empty() {
            write!(f, "{:?}", self.bound)?;
        }
        Ok(())
    }
}
