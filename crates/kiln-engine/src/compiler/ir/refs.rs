//! Reference tables (lexical scopes) and local references
//!
//! A module owns one [`ReferenceTables`] arena. Each block points at a table
//! in that arena by [`TableId`]; tables chain to their lexical parent, and the
//! chain ends at the module's global table.

use super::IrError;
use rustc_hash::FxHashMap;
use std::fmt;

/// Storage class of a local reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// `let` inside a function
    Constant,
    /// `var` inside a function
    Variable,
    /// `let` at module level
    ModuleConstant,
    /// `var` at module level
    ModuleVariable,
}

impl ReferenceKind {
    /// Whether the reference may not be reassigned
    pub fn is_constant(self) -> bool {
        matches!(self, ReferenceKind::Constant | ReferenceKind::ModuleConstant)
    }

    /// Whether the reference lives in module state rather than a frame slot
    pub fn is_module_state(self) -> bool {
        matches!(
            self,
            ReferenceKind::ModuleConstant | ReferenceKind::ModuleVariable
        )
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::Constant => "let",
            ReferenceKind::Variable => "var",
            ReferenceKind::ModuleConstant => "module let",
            ReferenceKind::ModuleVariable => "module var",
        };
        f.write_str(s)
    }
}

/// A named storage slot
#[derive(Debug, Clone, PartialEq)]
pub struct LocalReference {
    /// Identifier
    pub name: String,
    /// Storage class
    pub kind: ReferenceKind,
    /// Frame slot, -1 until reference resolution assigns one
    pub index: i32,
    /// Introduced by the compiler rather than the programmer
    pub synthetic: bool,
}

impl LocalReference {
    /// Create an unindexed reference
    pub fn new(name: impl Into<String>, kind: ReferenceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            index: -1,
            synthetic: false,
        }
    }

    /// Create a compiler-introduced reference
    pub fn synthetic(name: impl Into<String>, kind: ReferenceKind) -> Self {
        Self {
            synthetic: true,
            ..Self::new(name, kind)
        }
    }

    /// Whether the reference may not be reassigned
    pub fn is_constant(&self) -> bool {
        self.kind.is_constant()
    }

    /// Whether the reference lives in module state
    pub fn is_module_state(&self) -> bool {
        self.kind.is_module_state()
    }

    /// Whether a slot index has been assigned
    pub fn has_index(&self) -> bool {
        self.index >= 0
    }
}

/// Index of a table in a module's [`ReferenceTables`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// One lexical scope
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    parent: Option<TableId>,
    /// Declaration order, for deterministic iteration
    order: Vec<String>,
    references: FxHashMap<String, LocalReference>,
}

impl ReferenceTable {
    /// Enclosing table
    pub fn parent(&self) -> Option<TableId> {
        self.parent
    }

    /// Number of references declared directly in this table
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the table declares nothing
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether `name` is declared directly in this table
    pub fn has_own(&self, name: &str) -> bool {
        self.references.contains_key(name)
    }

    /// References declared directly in this table, in declaration order
    pub fn owned(&self) -> impl Iterator<Item = &LocalReference> {
        self.order.iter().filter_map(|name| self.references.get(name))
    }
}

/// Arena of the reference tables of one module
#[derive(Debug, Clone)]
pub struct ReferenceTables {
    tables: Vec<ReferenceTable>,
}

/// A reference found by walking a table chain
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<'a> {
    /// Table that declares the reference
    pub table: TableId,
    /// The declaration
    pub reference: &'a LocalReference,
}

impl ReferenceTables {
    /// Create an arena holding only the global table
    pub fn new() -> Self {
        Self {
            tables: vec![ReferenceTable::default()],
        }
    }

    /// The module-level table every other chain ends in
    pub fn root(&self) -> TableId {
        TableId(0)
    }

    /// Number of tables in the arena
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the arena holds only the global table
    pub fn is_empty(&self) -> bool {
        self.tables.len() <= 1
    }

    /// Create a new table nested in `parent`
    pub fn fork(&mut self, parent: TableId) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.tables.push(ReferenceTable {
            parent: Some(parent),
            ..ReferenceTable::default()
        });
        id
    }

    /// Create a table with no parent yet
    ///
    /// Macros build IR with detached tables; the expander relinks them to the
    /// scope the expansion lands in.
    pub fn detached(&mut self) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.tables.push(ReferenceTable::default());
        id
    }

    /// Borrow a table
    pub fn get(&self, id: TableId) -> Result<&ReferenceTable, IrError> {
        self.tables
            .get(id.0 as usize)
            .ok_or(IrError::UnknownTable(id))
    }

    fn get_mut(&mut self, id: TableId) -> Result<&mut ReferenceTable, IrError> {
        self.tables
            .get_mut(id.0 as usize)
            .ok_or(IrError::UnknownTable(id))
    }

    /// Parent of a table
    pub fn parent(&self, id: TableId) -> Option<TableId> {
        self.tables.get(id.0 as usize).and_then(|t| t.parent)
    }

    /// Re-parent a table
    pub fn relink(&mut self, id: TableId, new_parent: TableId) -> Result<(), IrError> {
        if id == new_parent || self.is_ancestor(id, new_parent) {
            return Err(IrError::CyclicTableLink(id, new_parent));
        }
        self.get_mut(new_parent)?;
        self.get_mut(id)?.parent = Some(new_parent);
        Ok(())
    }

    /// Whether `ancestor` appears on the parent chain of `id`
    pub fn is_ancestor(&self, ancestor: TableId, id: TableId) -> bool {
        let mut current = self.parent(id);
        while let Some(t) = current {
            if t == ancestor {
                return true;
            }
            current = self.parent(t);
        }
        false
    }

    /// Declare a reference in a table
    ///
    /// Names are unique per table; shadowing an outer table is fine.
    pub fn declare(&mut self, id: TableId, reference: LocalReference) -> Result<(), IrError> {
        let table = self.get_mut(id)?;
        if table.references.contains_key(&reference.name) {
            return Err(IrError::DuplicateReference(reference.name));
        }
        table.order.push(reference.name.clone());
        table.references.insert(reference.name.clone(), reference);
        Ok(())
    }

    /// Declare `reference` unless the table already has that name
    pub fn declare_if_absent(&mut self, id: TableId, reference: LocalReference) -> Result<(), IrError> {
        if self.get(id)?.has_own(&reference.name) {
            return Ok(());
        }
        self.declare(id, reference)
    }

    /// Remove a reference declared directly in `id`
    pub fn remove(&mut self, id: TableId, name: &str) -> Option<LocalReference> {
        let table = self.tables.get_mut(id.0 as usize)?;
        let removed = table.references.remove(name)?;
        table.order.retain(|n| n != name);
        Some(removed)
    }

    /// Look `name` up, walking outward through parents
    pub fn resolve(&self, id: TableId, name: &str) -> Option<Resolved<'_>> {
        let table_id = self.declaring_table(id, name)?;
        let reference = self.tables[table_id.0 as usize].references.get(name)?;
        Some(Resolved {
            table: table_id,
            reference,
        })
    }

    /// Table on the chain from `id` that declares `name`
    pub fn declaring_table(&self, id: TableId, name: &str) -> Option<TableId> {
        let mut current = Some(id);
        while let Some(t) = current {
            let table = self.tables.get(t.0 as usize)?;
            if table.references.contains_key(name) {
                return Some(t);
            }
            current = table.parent;
        }
        None
    }

    /// Mutable access to a reference declared directly in `id`
    pub fn own_mut(&mut self, id: TableId, name: &str) -> Option<&mut LocalReference> {
        self.tables
            .get_mut(id.0 as usize)
            .and_then(|t| t.references.get_mut(name))
    }

    /// Mutable access to the declaration `name` resolves to from `id`
    pub fn resolve_mut(&mut self, id: TableId, name: &str) -> Option<&mut LocalReference> {
        let table = self.declaring_table(id, name)?;
        self.own_mut(table, name)
    }

    /// References declared directly in `id`, in declaration order
    pub fn owned(&self, id: TableId) -> Vec<LocalReference> {
        match self.get(id) {
            Ok(table) => table.owned().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Names visible from `id`, innermost first
    pub fn visible_names(&self, id: TableId) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(t) = current {
            let Some(table) = self.tables.get(t.0 as usize) else {
                break;
            };
            for name in &table.order {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            current = table.parent;
        }
        names
    }

    /// Move every reference of `from` into `to`
    ///
    /// Fails without moving anything if a name would collide.
    pub fn merge_into(&mut self, from: TableId, to: TableId) -> Result<(), IrError> {
        let moved = self.owned(from);
        {
            let target = self.get(to)?;
            if let Some(clash) = moved.iter().find(|r| target.has_own(&r.name)) {
                return Err(IrError::DuplicateReference(clash.name.clone()));
            }
        }
        for reference in moved {
            self.remove(from, &reference.name);
            self.declare(to, reference)?;
        }
        Ok(())
    }

    /// Iterate every table with its id
    pub fn iter(&self) -> impl Iterator<Item = (TableId, &ReferenceTable)> {
        self.tables
            .iter()
            .enumerate()
            .map(|(i, t)| (TableId(i as u32), t))
    }
}

impl Default for ReferenceTables {
    fn default() -> Self {
        Self::new()
    }
}
