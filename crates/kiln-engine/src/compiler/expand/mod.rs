//! Macro expansion
//!
//! Replaces every macro invocation with the IR its compile-time procedure
//! produces. Expansion is depth-first: arguments are expanded before the
//! macro sees them, and by default the produced IR is expanded again until no
//! invocation is left or `max_expansion_depth` is exceeded.
//!
//! Macro names are searched in this order:
//!
//! 1. the name as written, when it is qualified
//! 2. namespaces added by `use` in the module, most recent first
//! 3. `<module>.name`
//! 4. `<import>.name` for each import in order
//! 5. `<import>.macros.name` for each import in order
//! 6. `<fallback>.name`
//!
//! `use` itself is handled here and never looked up.

pub mod lookup;

pub use lookup::{MacroDef, MacroLookup, MacroProcedure, MacroRegistry};

use crate::compiler::error::{CompileError, CompileResult};
use crate::compiler::ir::visitor::{walk_block, walk_function, walk_node};
use crate::compiler::ir::{
    Block, BlockBuilder, Composite, ConstValue, Function, IrError, MacroInvocation, Module, Node,
    NodeId, ReferenceTables, Span, TableId, ToplevelElements, Visitor,
};
use crate::compiler::options::CompilerOptions;
use std::sync::Arc;
use thiserror::Error;

/// Name of the built-in pseudo-macro that extends the search order
pub const USE_MACRO: &str = "use";

/// Failure raised by a macro procedure
#[derive(Debug, Error)]
#[error("{message}")]
pub struct MacroFailure {
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MacroFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }
}

impl From<IrError> for MacroFailure {
    fn from(e: IrError) -> Self {
        MacroFailure::with_cause("invalid IR produced by macro", e)
    }
}

/// What a macro produced
#[derive(Debug)]
pub enum MacroOutput {
    /// Replacement for the invocation
    Node(Node),
    /// Elements to add to the module
    Toplevel(ToplevelElements),
    /// Nothing; the invocation becomes an empty block
    Nothing,
}

/// Compile-time environment handed to a macro procedure
pub struct MacroContext<'a> {
    tables: &'a mut ReferenceTables,
    module: &'a str,
    position: Option<Span>,
    table: TableId,
}

impl<'a> MacroContext<'a> {
    pub fn new(tables: &'a mut ReferenceTables, module: &'a str, position: Option<Span>, table: TableId) -> Self {
        Self {
            tables,
            module,
            position,
            table,
        }
    }

    /// Reference tables of the module being compiled
    pub fn tables(&mut self) -> &mut ReferenceTables {
        &mut *self.tables
    }

    pub fn module_name(&self) -> &str {
        self.module
    }

    /// Position of the invocation
    pub fn position(&self) -> Option<Span> {
        self.position
    }

    /// Table of the block the expansion lands in
    pub fn table(&self) -> TableId {
        self.table
    }

    /// Build a block whose table is relinked into the expansion site
    pub fn block(&mut self, build: impl FnOnce(&mut BlockBuilder<'_>)) -> Result<Node, MacroFailure> {
        let mut builder = BlockBuilder::detached(&mut *self.tables);
        build(&mut builder);
        Ok(Node::Block(builder.build()?))
    }
}

/// Candidate qualified names for a macro, in search order
///
/// Every import's own namespace is tried before any import's `macros`
/// sub-namespace.
pub fn search_order(name: &str, module: &str, used: &[String], imports: &[String], fallback: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    if name.contains('.') {
        candidates.push(name.to_string());
    }
    for namespace in used {
        candidates.push(format!("{}.{}", namespace, name));
    }
    candidates.push(format!("{}.{}", module, name));
    candidates.extend(imports.iter().map(|import| format!("{}.{}", import, name)));
    candidates.extend(imports.iter().map(|import| format!("{}.macros.{}", import, name)));
    candidates.push(format!("{}.{}", fallback, name));
    candidates
}

// ============================================================================
// Expander
// ============================================================================

/// Macro expander for whole modules
pub struct MacroExpander {
    lookup: Arc<dyn MacroLookup>,
    recursive: bool,
    max_depth: usize,
    fallback: String,
}

impl MacroExpander {
    pub fn new(lookup: Arc<dyn MacroLookup>, options: &CompilerOptions) -> Self {
        Self {
            lookup,
            recursive: options.recursive_expansion,
            max_depth: options.max_expansion_depth,
            fallback: options.macro_fallback_namespace.clone(),
        }
    }

    /// Expand only the invocations present in the input, not those produced
    pub fn single_pass(mut self) -> Self {
        self.recursive = false;
        self
    }

    /// Expand every macro invocation of a module
    pub fn expand_module(&self, module: &mut Module) -> CompileResult<()> {
        log::debug!("expanding macros in module {}", module.name);
        let mut tables = std::mem::take(&mut module.tables);
        let result = self.expand_with(module, &mut tables);
        module.tables = tables;
        result?;
        protect_type_names(module);
        Ok(())
    }

    fn expand_with(&self, module: &mut Module, tables: &mut ReferenceTables) -> CompileResult<()> {
        let mut visitor = ExpansionVisitor {
            expander: self,
            module: module.name.clone(),
            imports: module.imports.iter().map(|i| i.name.clone()).collect(),
            tables,
            used: Vec::new(),
            stack: Vec::new(),
            depth: 0,
            toplevel: Vec::new(),
        };

        let root = visitor.tables.root();
        for mut invocation in std::mem::take(&mut module.toplevel_macros) {
            visitor.stack.push(root);
            let walked = invocation
                .walk(&mut visitor)
                .and_then(|_| visitor.expand_children(&mut invocation, root));
            visitor.stack.pop();
            walked?;
            match invocation {
                Node::MacroInvocation(call) => visitor.expand_toplevel(call)?,
                other => log::trace!("ignoring module-level {} that is not a macro call", other.kind_name()),
            }
            for elements in std::mem::take(&mut visitor.toplevel) {
                visitor.imports.extend(elements.imports.iter().cloned());
                module.merge(elements);
            }
        }

        for function in module.all_functions_mut() {
            visitor.visit_function(function)?;
        }
        for elements in std::mem::take(&mut visitor.toplevel) {
            module.merge(elements);
        }
        Ok(())
    }
}

/// Move augmentations that target a declared type into its private namespace
fn protect_type_names(module: &mut Module) {
    let types: Vec<String> = module.type_names().iter().map(|s| s.to_string()).collect();
    for type_name in types {
        if module.applications.contains_key(&type_name) {
            continue;
        }
        if let Some(functions) = module.augmentations.remove(&type_name) {
            let key = module.type_namespace(&type_name);
            log::trace!("augmentation of {} moved to {}", type_name, key);
            module.augmentations.entry(key).or_default().extend(functions);
        }
    }
}

struct ExpansionVisitor<'a> {
    expander: &'a MacroExpander,
    tables: &'a mut ReferenceTables,
    module: String,
    imports: Vec<String>,
    /// Namespaces added by `use`, searched first
    used: Vec<String>,
    stack: Vec<TableId>,
    depth: usize,
    toplevel: Vec<ToplevelElements>,
}

impl ExpansionVisitor<'_> {
    fn current_table(&self) -> TableId {
        self.stack.last().copied().unwrap_or_else(|| self.tables.root())
    }

    fn find(&self, name: &str, arity: usize) -> Option<Arc<MacroDef>> {
        search_order(name, &self.module, &self.used, &self.imports, &self.expander.fallback)
            .into_iter()
            .find_map(|candidate| {
                let found = self.expander.lookup.find(&candidate, arity);
                if found.is_some() {
                    log::trace!("macro {} resolved to {}", name, candidate);
                }
                found
            })
    }

    fn apply_use(&mut self, call: &MacroInvocation) -> CompileResult<()> {
        let mut namespaces = Vec::with_capacity(call.arguments.len());
        for argument in &call.arguments {
            match argument.as_constant() {
                Some(ConstValue::Str(ns)) | Some(ConstValue::ClassRef(ns)) => namespaces.push(ns.clone()),
                _ => {
                    return Err(CompileError::MacroFailure {
                        name: USE_MACRO.to_string(),
                        source: MacroFailure::new("`use` takes namespace names as string literals"),
                    })
                }
            }
        }
        log::trace!("use {:?} in module {}", namespaces, self.module);
        namespaces.append(&mut self.used);
        self.used = namespaces;
        Ok(())
    }

    fn invoke(&mut self, call: MacroInvocation, table: TableId) -> CompileResult<MacroOutput> {
        if self.depth >= self.expander.max_depth {
            return Err(CompileError::ExpansionTooDeep {
                name: call.name,
                depth: self.depth,
            });
        }
        let arity = call.arguments.len();
        let position = call.meta.position;
        let def = self.find(&call.name, arity).ok_or_else(|| CompileError::MacroNotFound {
            name: call.name.clone(),
            arity,
            position,
        })?;
        let mut context = MacroContext::new(&mut *self.tables, &self.module, position, table);
        def.invoke(&mut context, call.arguments)
            .map_err(|source| CompileError::MacroFailure {
                name: call.name,
                source,
            })
    }

    /// Expand one invocation found in a function body
    fn expand_invocation(&mut self, call: MacroInvocation, table: TableId) -> CompileResult<Node> {
        if call.name == USE_MACRO {
            self.apply_use(&call)?;
            return Ok(Node::noop("use"));
        }
        let name = call.name.clone();
        let position = call.meta.position;
        let mut replacement = match self.invoke(call, table)? {
            MacroOutput::Node(node) => node,
            MacroOutput::Nothing => Node::Block(Block::empty(self.tables.fork(table))),
            MacroOutput::Toplevel(elements) => {
                self.push_toplevel(elements)?;
                Node::noop(format!("top-level elements from &{}", name))
            }
        };
        if replacement.position().is_none() {
            replacement.meta_mut().position = position;
        }
        self.relink(&mut replacement, table)?;
        log::trace!("expanded &{} into {}", name, replacement.kind_name());

        if self.expander.recursive {
            self.depth += 1;
            self.stack.push(table);
            let result = self.reexpand(replacement, table);
            self.stack.pop();
            self.depth -= 1;
            replacement = result?;
        }
        Ok(replacement)
    }

    fn reexpand(&mut self, mut replacement: Node, table: TableId) -> CompileResult<Node> {
        replacement.accept(self)?;
        match replacement {
            Node::MacroInvocation(call) => self.expand_invocation(call, table),
            other => Ok(other),
        }
    }

    /// Attach the tables introduced by a replacement to the expansion site
    fn relink(&mut self, replacement: &mut Node, table: TableId) -> Result<(), IrError> {
        if let Node::Block(block) = replacement {
            if block.table != table && !self.tables.is_ancestor(block.table, table) {
                self.tables.relink(block.table, table)?;
            }
        }
        let mut relinker = Relinker {
            tables: &mut *self.tables,
            stack: vec![table],
        };
        replacement.accept(&mut relinker)
    }

    fn push_toplevel(&mut self, mut elements: ToplevelElements) -> CompileResult<()> {
        if self.expander.recursive {
            let functions = elements
                .functions
                .iter_mut()
                .chain(elements.augmentations.iter_mut().flat_map(|(_, f)| f.iter_mut()))
                .chain(elements.named_augmentations.iter_mut().flat_map(|(_, f)| f.iter_mut()));
            for function in functions {
                self.depth += 1;
                let result = self.visit_function(function);
                self.depth -= 1;
                result?;
            }
        }
        self.toplevel.push(elements);
        Ok(())
    }

    fn expand_toplevel(&mut self, call: MacroInvocation) -> CompileResult<()> {
        if call.name == USE_MACRO {
            return self.apply_use(&call);
        }
        let name = call.name.clone();
        let root = self.tables.root();
        match self.invoke(call, root)? {
            MacroOutput::Toplevel(elements) => self.push_toplevel(elements),
            MacroOutput::Nothing => Ok(()),
            MacroOutput::Node(Node::Noop(_)) => Ok(()),
            MacroOutput::Node(Node::Block(block)) if block.is_empty() => Ok(()),
            MacroOutput::Node(other) => Err(CompileError::MacroFailure {
                name,
                source: MacroFailure::new(format!(
                    "module-level macro produced a {} instead of top-level elements",
                    other.kind_name()
                )),
            }),
        }
    }

    /// Expand the direct children of `parent` that are macro invocations
    fn expand_children<C: Composite + ?Sized>(&mut self, parent: &mut C, table: TableId) -> CompileResult<()> {
        let invocations: Vec<NodeId> = parent
            .children()
            .into_iter()
            .filter(|c| matches!(c, Node::MacroInvocation(_)))
            .map(|c| c.id())
            .collect();
        for id in invocations {
            let Some(Node::MacroInvocation(call)) = parent.child_mut(id) else {
                continue;
            };
            let call = MacroInvocation {
                meta: call.meta.clone(),
                name: std::mem::take(&mut call.name),
                arguments: std::mem::take(&mut call.arguments),
            };
            let replacement = self.expand_invocation(call, table)?;
            parent.replace_element(id, replacement)?;
        }
        Ok(())
    }
}

impl Visitor for ExpansionVisitor<'_> {
    type Error = CompileError;

    fn visit_function(&mut self, function: &mut Function) -> CompileResult<()> {
        let table = function.body.table;
        self.stack.push(table);
        let result = walk_function(self, function)
            .and_then(|_| self.expand_children(&mut function.body, table))
            .and_then(|_| self.expand_children(function, table));
        self.stack.pop();
        result
    }

    fn visit_block(&mut self, block: &mut Block) -> CompileResult<()> {
        self.stack.push(block.table);
        let result = walk_block(self, block);
        self.stack.pop();
        result
    }

    fn visit_node(&mut self, node: &mut Node) -> CompileResult<()> {
        walk_node(self, node)?;
        let table = match node {
            Node::Block(block) => block.table,
            _ => self.current_table(),
        };
        self.expand_children(node, table)
    }
}

/// Links parentless tables in a macro's output to their enclosing block
struct Relinker<'t> {
    tables: &'t mut ReferenceTables,
    stack: Vec<TableId>,
}

impl Visitor for Relinker<'_> {
    type Error = IrError;

    fn visit_block(&mut self, block: &mut Block) -> Result<(), IrError> {
        if let Some(&enclosing) = self.stack.last() {
            let detached = self.tables.parent(block.table).is_none() && block.table != self.tables.root();
            if detached && block.table != enclosing {
                self.tables.relink(block.table, enclosing)?;
            }
        }
        self.stack.push(block.table);
        let result = walk_block(self, block);
        self.stack.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{FunctionBuilder, PrettyPrint, StructDecl};

    fn expander(registry: MacroRegistry) -> MacroExpander {
        MacroExpander::new(Arc::new(registry), &CompilerOptions::default())
    }

    fn module_with_body(statements: Vec<Node>) -> Module {
        let mut module = Module::new("demo");
        module.add_default_imports(&["kiln.standard", "kiln.lang"]);
        let mut builder = FunctionBuilder::new(&mut module.tables, "main");
        for statement in statements {
            builder.push(statement);
        }
        let function = builder.build().unwrap();
        module.add_function(function);
        module
    }

    #[test]
    fn test_search_order() {
        let order = search_order(
            "twice",
            "demo",
            &["extra".to_string()],
            &["kiln.standard".to_string(), "lib.util".to_string()],
            "kiln.macros",
        );
        assert_eq!(
            order,
            vec![
                "extra.twice",
                "demo.twice",
                "kiln.standard.twice",
                "lib.util.twice",
                "kiln.standard.macros.twice",
                "lib.util.macros.twice",
                "kiln.macros.twice",
            ]
        );
        let qualified = search_order("a.b", "demo", &[], &[], "kiln.macros");
        assert_eq!(qualified[0], "a.b");
    }

    #[test]
    fn test_arguments_expand_before_macro_sees_them() {
        let mut registry = MacroRegistry::new();
        registry.register(
            "kiln.macros.one",
            MacroDef::new("one", 0, |_, _| Ok(MacroOutput::Node(Node::constant(1)))),
        );
        registry.register(
            "kiln.macros.check",
            MacroDef::new("check", 1, |_, args| {
                if args[0].is_constant() {
                    Ok(MacroOutput::Node(Node::constant(true)))
                } else {
                    Err(MacroFailure::new("argument was not expanded"))
                }
            }),
        );
        let mut module = module_with_body(vec![Node::ret(Node::macro_call(
            "check",
            vec![Node::macro_call("one", vec![])],
        ))]);

        expander(registry).expand_module(&mut module).unwrap();
        let dump = module.functions[0].pretty_print();
        assert!(dump.contains("const true"), "{}", dump);
        assert!(!dump.contains("macro"));
    }

    #[test]
    fn test_missing_macro_is_hard_error() {
        let mut module = module_with_body(vec![Node::macro_call("nowhere", vec![])]);
        let err = expander(MacroRegistry::new()).expand_module(&mut module).unwrap_err();
        assert!(matches!(err, CompileError::MacroNotFound { name, arity: 0, .. } if name == "nowhere"));
    }

    #[test]
    fn test_failing_macro_carries_name() {
        let mut registry = MacroRegistry::new();
        registry.register(
            "demo.boom",
            MacroDef::new("boom", 0, |_, _| Err(MacroFailure::new("kaboom"))),
        );
        let mut module = module_with_body(vec![Node::macro_call("boom", vec![])]);
        let err = expander(registry).expand_module(&mut module).unwrap_err();
        match err {
            CompileError::MacroFailure { name, source } => {
                assert_eq!(name, "boom");
                assert_eq!(source.message, "kaboom");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_nothing_becomes_empty_block() {
        let mut registry = MacroRegistry::new();
        registry.register("demo.quiet", MacroDef::new("quiet", 0, |_, _| Ok(MacroOutput::Nothing)));
        let mut module = module_with_body(vec![Node::macro_call("quiet", vec![])]);
        expander(registry).expand_module(&mut module).unwrap();
        let body = &module.functions[0].body;
        let Node::Block(block) = &body.statements[0] else {
            panic!("expected block");
        };
        assert!(block.is_empty());
        assert_eq!(module.tables.parent(block.table), Some(body.table));
    }

    #[test]
    fn test_replacement_locals_become_visible() {
        let mut registry = MacroRegistry::new();
        registry.register(
            "demo.define",
            MacroDef::new("define", 0, |ctx, _| {
                let block = ctx.block(|b| {
                    b.let_("generated", Node::constant(7));
                })?;
                Ok(MacroOutput::Node(block))
            }),
        );
        let mut module = module_with_body(vec![Node::macro_call("define", vec![])]);
        expander(registry).expand_module(&mut module).unwrap();

        let body = &module.functions[0].body;
        let Node::Block(block) = &body.statements[0] else {
            panic!("expected block");
        };
        assert_eq!(module.tables.parent(block.table), Some(body.table));
        assert!(module.tables.resolve(block.table, "generated").is_some());
    }

    #[test]
    fn test_use_prepends_namespace() {
        let mut registry = MacroRegistry::new();
        registry.register(
            "my.tools.answer",
            MacroDef::new("answer", 0, |_, _| Ok(MacroOutput::Node(Node::constant(42)))),
        );
        let mut module = module_with_body(vec![
            Node::macro_call("use", vec![Node::constant("my.tools")]),
            Node::ret(Node::macro_call("answer", vec![])),
        ]);
        expander(registry).expand_module(&mut module).unwrap();
        assert!(module.functions[0].pretty_print().contains("const 42"));
    }

    #[test]
    fn test_self_reproducing_macro_is_bounded() {
        let mut registry = MacroRegistry::new();
        registry.register(
            "demo.forever",
            MacroDef::new("forever", 0, |_, _| {
                Ok(MacroOutput::Node(Node::macro_call("forever", vec![])))
            }),
        );
        let mut options = CompilerOptions::default();
        options.max_expansion_depth = 8;
        let expander = MacroExpander::new(Arc::new(registry), &options);
        let mut module = module_with_body(vec![Node::macro_call("forever", vec![])]);
        let err = expander.expand_module(&mut module).unwrap_err();
        assert!(matches!(err, CompileError::ExpansionTooDeep { depth: 8, .. }));
    }

    #[test]
    fn test_single_pass_leaves_produced_invocations() {
        let mut registry = MacroRegistry::new();
        registry.register(
            "demo.outer",
            MacroDef::new("outer", 0, |_, _| {
                Ok(MacroOutput::Node(Node::macro_call("inner", vec![])))
            }),
        );
        let mut module = module_with_body(vec![Node::macro_call("outer", vec![])]);
        expander(registry).single_pass().expand_module(&mut module).unwrap();
        assert!(matches!(
            module.functions[0].body.statements[0],
            Node::MacroInvocation(ref m) if m.name == "inner"
        ));
    }

    #[test]
    fn test_toplevel_macro_adds_functions() {
        let mut registry = MacroRegistry::new();
        registry.register(
            "demo.generate",
            MacroDef::new("generate", 0, |ctx, _| {
                let root = ctx.tables().root();
                let mut builder = FunctionBuilder::nested(ctx.tables(), root, "generated");
                builder.push(Node::ret(Node::constant(1)));
                let function = builder.build()?;
                Ok(MacroOutput::Toplevel(ToplevelElements {
                    functions: vec![function],
                    ..ToplevelElements::default()
                }))
            }),
        );
        let mut module = Module::new("demo");
        module.toplevel_macros.push(Node::macro_call("generate", vec![]));
        expander(registry).expand_module(&mut module).unwrap();
        assert!(module.function("generated").is_some());
        assert!(module.toplevel_macros.is_empty());
    }

    #[test]
    fn test_augmentation_colliding_with_type_is_rekeyed() {
        let mut module = Module::new("demo");
        module.add_struct(StructDecl {
            name: "Point".into(),
            members: vec!["x".into(), "y".into()],
        });
        let mut builder = FunctionBuilder::new(&mut module.tables, "norm");
        builder.param("this");
        builder.push(Node::ret(Node::constant(0)));
        let function = builder.build().unwrap();
        module.add_augmentation("Point", vec![function]);

        expander(MacroRegistry::new()).expand_module(&mut module).unwrap();
        assert!(!module.augmentations.contains_key("Point"));
        assert!(module.augmentations.contains_key("demo.types.Point"));
    }

    #[test]
    fn test_module_without_macros_is_unchanged() {
        let mut module = module_with_body(vec![Node::ret(Node::binary(
            crate::compiler::ir::Operator::Plus,
            Node::constant(1),
            Node::lookup("x"),
        ))]);
        let before = module.pretty_print();
        expander(MacroRegistry::new()).expand_module(&mut module).unwrap();
        assert_eq!(module.pretty_print(), before);
    }
}
