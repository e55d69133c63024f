//! IR Module
//!
//! Top-level container for one compilation unit.

use super::function::{Function, FunctionScope};
use super::meta::Meta;
use super::node::{Assignment, Block, Node};
use super::refs::{LocalReference, ReferenceKind, ReferenceTables};
use super::IrError;
use std::collections::BTreeMap;

/// Name of the synthesized module initializer
pub const MODULE_INIT: &str = "<clinit>";

/// An imported module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub name: String,
    /// Added by default rather than written in source
    pub implicit: bool,
}

impl Import {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implicit: false,
        }
    }

    pub fn implicit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implicit: true,
        }
    }

    /// Last dotted segment, usable as a short alias
    pub fn suffix(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// Struct declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub members: Vec<String>,
}

/// Union declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionDecl {
    pub name: String,
    pub variants: Vec<String>,
}

/// Elements a module-level macro may contribute
#[derive(Debug, Clone, Default)]
pub struct ToplevelElements {
    pub functions: Vec<Function>,
    pub structs: Vec<StructDecl>,
    pub unions: Vec<UnionDecl>,
    pub augmentations: Vec<(String, Vec<Function>)>,
    pub named_augmentations: Vec<(String, Vec<Function>)>,
    pub applications: Vec<(String, Vec<String>)>,
    pub imports: Vec<String>,
}

impl ToplevelElements {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
            && self.structs.is_empty()
            && self.unions.is_empty()
            && self.augmentations.is_empty()
            && self.named_augmentations.is_empty()
            && self.applications.is_empty()
            && self.imports.is_empty()
    }
}

/// A compilation unit
#[derive(Debug, Clone)]
pub struct Module {
    pub meta: Meta,
    pub name: String,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    pub macros: Vec<Function>,
    pub structs: Vec<StructDecl>,
    pub unions: Vec<UnionDecl>,
    /// Target type name -> functions attached to it
    pub augmentations: BTreeMap<String, Vec<Function>>,
    /// Augmentation name -> functions, applied indirectly
    pub named_augmentations: BTreeMap<String, Vec<Function>>,
    /// Target type name -> named augmentations applied to it
    pub applications: BTreeMap<String, Vec<String>>,
    /// Module-level references, in declaration order
    pub module_state: Vec<String>,
    pub initializer: Option<Function>,
    /// Macro invocations at module level, expanded before function bodies
    pub toplevel_macros: Vec<Node>,
    pub tables: ReferenceTables,
}

impl Module {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: Meta::new(),
            name: name.into(),
            imports: Vec::new(),
            functions: Vec::new(),
            macros: Vec::new(),
            structs: Vec::new(),
            unions: Vec::new(),
            augmentations: BTreeMap::new(),
            named_augmentations: BTreeMap::new(),
            applications: BTreeMap::new(),
            module_state: Vec::new(),
            initializer: None,
            toplevel_macros: Vec::new(),
            tables: ReferenceTables::new(),
        }
    }

    /// Add an explicit import, ignoring duplicates
    pub fn add_import(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.has_import(&name) {
            self.imports.push(Import::new(name));
        }
    }

    /// Add the implicit prelude imports that are not already present
    pub fn add_default_imports<S: AsRef<str>>(&mut self, names: &[S]) {
        for name in names {
            let name = name.as_ref();
            if !self.has_import(name) {
                self.imports.push(Import::implicit(name));
            }
        }
    }

    pub fn has_import(&self, name: &str) -> bool {
        self.imports.iter().any(|i| i.name == name)
    }

    /// Add a module function
    pub fn add_function(&mut self, mut function: Function) {
        function.meta.parent = Some(self.meta.id);
        self.functions.push(function);
    }

    /// Add a compile-time macro
    pub fn add_macro(&mut self, mut function: Function) {
        function.is_macro = true;
        function.meta.parent = Some(self.meta.id);
        self.macros.push(function);
    }

    pub fn add_struct(&mut self, decl: StructDecl) {
        self.structs.push(decl);
    }

    pub fn add_union(&mut self, decl: UnionDecl) {
        self.unions.push(decl);
    }

    /// Attach functions to a target type; repeated targets accumulate
    pub fn add_augmentation(&mut self, target: impl Into<String>, functions: Vec<Function>) {
        let parent = self.meta.id;
        let entry = self.augmentations.entry(target.into()).or_default();
        for mut function in functions {
            function.scope = FunctionScope::Augmentation;
            function.meta.parent = Some(parent);
            entry.push(function);
        }
    }

    /// Define functions under an augmentation name
    pub fn add_named_augmentation(&mut self, name: impl Into<String>, functions: Vec<Function>) {
        let parent = self.meta.id;
        let entry = self.named_augmentations.entry(name.into()).or_default();
        for mut function in functions {
            function.scope = FunctionScope::Augmentation;
            function.meta.parent = Some(parent);
            entry.push(function);
        }
    }

    /// Apply named augmentations to a target type
    pub fn apply_named_augmentations<S: Into<String>>(&mut self, target: impl Into<String>, names: impl IntoIterator<Item = S>) {
        let entry = self.applications.entry(target.into()).or_default();
        for name in names {
            let name = name.into();
            if !entry.contains(&name) {
                entry.push(name);
            }
        }
    }

    /// Names of declared structs and unions
    pub fn type_names(&self) -> Vec<&str> {
        self.structs
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.unions.iter().map(|u| u.name.as_str()))
            .collect()
    }

    /// Private namespace of a type declared in this module
    pub fn type_namespace(&self, type_name: &str) -> String {
        format!("{}.types.{}", self.name, type_name)
    }

    /// The module initializer, created on first use
    pub fn initializer_mut(&mut self) -> &mut Function {
        let root = self.tables.root();
        let parent = self.meta.id;
        let tables = &mut self.tables;
        self.initializer.get_or_insert_with(|| {
            let body = Block::empty(tables.fork(root));
            let mut init = Function::new(MODULE_INIT, body);
            init.is_module_init = true;
            init.visibility = super::Visibility::Local;
            init.meta.parent = Some(parent);
            init
        })
    }

    /// Declare a module-level reference initialized in the module initializer
    pub fn declare_state(&mut self, name: impl Into<String>, constant: bool, value: Node) -> Result<(), IrError> {
        let name = name.into();
        let kind = if constant {
            ReferenceKind::ModuleConstant
        } else {
            ReferenceKind::ModuleVariable
        };
        let root = self.tables.root();
        self.tables.declare(root, LocalReference::new(name.clone(), kind))?;
        self.module_state.push(name.clone());
        let assignment = Node::Assignment(Assignment {
            meta: Meta::new(),
            name,
            value: Box::new(value),
            declaring: true,
            resolved: None,
        });
        self.initializer_mut().body.push(assignment);
        Ok(())
    }

    /// Add elements contributed by a module-level macro
    pub fn merge(&mut self, elements: ToplevelElements) {
        for import in elements.imports {
            self.add_import(import);
        }
        for function in elements.functions {
            self.add_function(function);
        }
        self.structs.extend(elements.structs);
        self.unions.extend(elements.unions);
        for (target, functions) in elements.augmentations {
            self.add_augmentation(target, functions);
        }
        for (name, functions) in elements.named_augmentations {
            self.add_named_augmentation(name, functions);
        }
        for (target, names) in elements.applications {
            self.apply_named_augmentations(target, names);
        }
    }

    /// Every function of the module: plain, macros, augmentations, initializer
    pub fn all_functions(&self) -> Vec<&Function> {
        self.functions
            .iter()
            .chain(self.macros.iter())
            .chain(self.augmentations.values().flatten())
            .chain(self.named_augmentations.values().flatten())
            .chain(self.initializer.iter())
            .collect()
    }

    /// Mutable view of [`Module::all_functions`]
    pub fn all_functions_mut(&mut self) -> Vec<&mut Function> {
        self.functions
            .iter_mut()
            .chain(self.macros.iter_mut())
            .chain(self.augmentations.values_mut().flatten())
            .chain(self.named_augmentations.values_mut().flatten())
            .chain(self.initializer.iter_mut())
            .collect()
    }

    /// Find a plain function by name
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// Set parent links throughout the module
    pub fn link_tree(&mut self) {
        let id = self.meta.id;
        for function in self.all_functions_mut() {
            function.meta.parent = Some(id);
            function.link_tree();
        }
        for invocation in &mut self.toplevel_macros {
            invocation.meta_mut().parent = Some(id);
            invocation.link_tree();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_augmentations_merge_additively() {
        let mut module = Module::new("demo");
        let t1 = module.tables.fork(module.tables.root());
        let t2 = module.tables.fork(module.tables.root());
        module.add_augmentation("String", vec![Function::new("shout", Block::empty(t1))]);
        module.add_augmentation("String", vec![Function::new("whisper", Block::empty(t2))]);

        let fns = &module.augmentations["String"];
        assert_eq!(fns.len(), 2);
        assert!(fns.iter().all(|f| f.scope == FunctionScope::Augmentation));
    }

    #[test]
    fn test_default_imports_do_not_duplicate() {
        let mut module = Module::new("demo");
        module.add_import("kiln.lang");
        module.add_default_imports(&["kiln.standard", "kiln.lang"]);
        let names: Vec<_> = module.imports.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["kiln.lang", "kiln.standard"]);
        assert!(module.imports[1].implicit);
    }

    #[test]
    fn test_declare_state_goes_through_initializer() {
        let mut module = Module::new("demo");
        module.declare_state("counter", false, Node::constant(0)).unwrap();
        let root = module.tables.root();
        let found = module.tables.resolve(root, "counter").unwrap();
        assert_eq!(found.reference.kind, ReferenceKind::ModuleVariable);

        let init = module.initializer.as_ref().unwrap();
        assert!(init.is_module_init);
        assert_eq!(init.body.statements.len(), 1);
        assert!(module.declare_state("counter", true, Node::constant(1)).is_err());
    }

    #[test]
    fn test_applications_accumulate_without_duplicates() {
        let mut module = Module::new("demo");
        module.apply_named_augmentations("Point", ["Printable"]);
        module.apply_named_augmentations("Point", ["Printable", "Comparable"]);
        assert_eq!(module.applications["Point"], vec!["Printable", "Comparable"]);
    }
}
