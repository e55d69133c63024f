//! IR Functions
//!
//! A function owns its body block. The body's reference table declares the
//! parameters and chains to the module's global table.

use super::meta::{Meta, NodeId};
use super::node::{replace_child, Block, Composite, Node};
use super::IrError;
use std::fmt;

/// Visibility of a module-level function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Local,
}

/// Where a function is declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionScope {
    /// Plain module function
    #[default]
    Module,
    /// Member of an augmentation
    Augmentation,
    /// Function literal, hoisted by capture analysis
    Closure,
}

impl fmt::Display for FunctionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FunctionScope::Module => "module",
            FunctionScope::Augmentation => "augmentation",
            FunctionScope::Closure => "closure",
        };
        f.write_str(s)
    }
}

/// An IR function
#[derive(Debug, Clone)]
pub struct Function {
    pub meta: Meta,
    pub name: String,
    pub visibility: Visibility,
    pub scope: FunctionScope,
    /// Parameter names, synthetic captured parameters first
    pub parameters: Vec<String>,
    /// Last parameter collects the remaining arguments
    pub varargs: bool,
    pub is_macro: bool,
    /// Synthesized module initializer
    pub is_module_init: bool,
    pub body: Block,
    /// Decorator expressions, outermost first
    pub decorators: Vec<Node>,
    /// Number of leading parameters introduced for captured names
    pub synthetic_parameter_count: usize,
    /// Local slot holding the closure itself, for recursive closures
    pub synthetic_self_name: Option<String>,
}

impl Function {
    /// Create a public module function with the given body
    pub fn new(name: impl Into<String>, body: Block) -> Self {
        let mut function = Self {
            meta: Meta::new(),
            name: name.into(),
            visibility: Visibility::Public,
            scope: FunctionScope::Module,
            parameters: Vec::new(),
            varargs: false,
            is_macro: false,
            is_module_init: false,
            body,
            decorators: Vec::new(),
            synthetic_parameter_count: 0,
            synthetic_self_name: None,
        };
        function.body.meta.parent = Some(function.meta.id);
        function
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Parameters as written by the programmer
    pub fn declared_parameters(&self) -> &[String] {
        &self.parameters[self.synthetic_parameter_count.min(self.parameters.len())..]
    }

    /// Captured-name parameters added by capture analysis
    pub fn synthetic_parameters(&self) -> &[String] {
        &self.parameters[..self.synthetic_parameter_count.min(self.parameters.len())]
    }

    pub fn is_closure(&self) -> bool {
        self.scope == FunctionScope::Closure
    }

    /// Whether a call with `arity` arguments matches this function
    pub fn accepts(&self, arity: usize) -> bool {
        if self.varargs {
            arity + 1 >= self.parameters.len()
        } else {
            arity == self.parameters.len()
        }
    }

    /// Set parent links throughout the body
    pub fn link_tree(&mut self) {
        self.body.meta.parent = Some(self.meta.id);
        self.adopt();
        self.body.adopt();
        for statement in &mut self.body.statements {
            statement.link_tree();
        }
        for decorator in &mut self.decorators {
            decorator.link_tree();
        }
    }
}

impl Composite for Function {
    fn element_id(&self) -> NodeId {
        self.meta.id
    }

    fn children(&self) -> Vec<&Node> {
        self.decorators.iter().collect()
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        self.decorators.iter_mut().collect()
    }

    /// Replace a decorator, or the whole body when `original` is the body
    fn replace_element(&mut self, original: NodeId, replacement: Node) -> Result<Node, IrError> {
        if original == self.body.meta.id {
            return match replacement {
                Node::Block(mut block) => {
                    block.meta.parent = Some(self.meta.id);
                    let mut displaced = std::mem::replace(&mut self.body, block);
                    displaced.meta.parent = None;
                    Ok(Node::Block(displaced))
                }
                _ => Err(IrError::NotAChild {
                    parent: self.meta.id,
                    child: original,
                }),
            };
        }
        replace_child(self, original, replacement)
    }
}
