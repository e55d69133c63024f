//! Pretty-printing for IR
//!
//! Produces a deterministic, indented dump of the tree. Node ids are left
//! out so that two structurally equal trees print identically.

use super::function::Function;
use super::module::Module;
use super::node::*;

/// Trait for pretty-printing IR constructs
pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    fn function(&mut self, function: &Function) {
        let mut header = format!(
            "{} {} fn {}({})",
            match function.visibility {
                super::Visibility::Public => "public",
                super::Visibility::Local => "local",
            },
            function.scope,
            function.name,
            function.parameters.join(", ")
        );
        if function.varargs {
            header.push_str(" ...");
        }
        if function.synthetic_parameter_count > 0 {
            header.push_str(&format!(" captures={}", function.synthetic_parameter_count));
        }
        if let Some(self_name) = &function.synthetic_self_name {
            header.push_str(&format!(" self={}", self_name));
        }
        self.line(&header);
        self.nested(|p| {
            for decorator in &function.decorators {
                p.line("@decorator");
                p.nested(|p| p.node(decorator));
            }
            p.block(&function.body);
        });
    }

    fn block(&mut self, block: &Block) {
        self.line("block");
        self.nested(|p| {
            for statement in &block.statements {
                p.node(statement);
            }
        });
    }

    fn labeled(&mut self, label: &str, node: &Node) {
        self.line(label);
        self.nested(|p| p.node(node));
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Block(b) => self.block(b),
            Node::Constant(c) => self.line(&format!("const {}", c.value)),
            Node::ReferenceLookup(r) => match &r.resolved {
                Some(resolved) => self.line(&format!("ref {} @{}", r.name, resolved.index)),
                None => self.line(&format!("ref {}", r.name)),
            },
            Node::Assignment(a) => {
                let keyword = if a.declaring { "declare" } else { "assign" };
                self.line(&format!("{} {}", keyword, a.name));
                self.nested(|p| p.node(&a.value));
            }
            Node::BinaryOperation(b) => {
                self.line(&format!("op {}", b.operator));
                self.nested(|p| {
                    p.node(&b.left);
                    p.node(&b.right);
                });
            }
            Node::UnaryOperation(u) => {
                self.line(&format!("op {}", u.operator));
                self.nested(|p| p.node(&u.operand));
            }
            Node::FunctionInvocation(call) => {
                let mut flags = Vec::new();
                if call.on_reference {
                    flags.push("on-reference");
                }
                if call.on_module_state {
                    flags.push("on-module-state");
                }
                if call.constant {
                    flags.push("constant");
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                };
                self.line(&format!("call {}{}", call.name, flags));
                self.nested(|p| {
                    for arg in call.arguments.iter().chain(&call.anonymous_calls) {
                        p.node(arg);
                    }
                });
            }
            Node::MethodInvocation(call) => {
                let op = if call.null_safe { "?:" } else { ":" };
                self.line(&format!("method {}{}", op, call.name));
                self.nested(|p| {
                    p.node(&call.receiver);
                    for arg in call.arguments.iter().chain(&call.anonymous_calls) {
                        p.node(arg);
                    }
                });
            }
            Node::MacroInvocation(call) => {
                self.line(&format!("macro &{}", call.name));
                self.nested(|p| {
                    for arg in &call.arguments {
                        p.node(arg);
                    }
                });
            }
            Node::NamedArgument(arg) => {
                self.labeled(&format!("named {}", arg.name), &arg.expression);
            }
            Node::ClosureReference(closure) => match &closure.target {
                ClosureTarget::Literal(function) => {
                    self.line("closure literal");
                    self.nested(|p| p.function(function));
                }
                ClosureTarget::Hoisted(name) => {
                    self.line(&format!("closure {} [{}]", name, closure.captured.join(", ")));
                }
            },
            Node::Collection(c) => {
                self.line(&format!("collection {}", c.kind));
                self.nested(|p| {
                    for element in &c.elements {
                        p.node(element);
                    }
                });
            }
            Node::Conditional(c) => {
                self.labeled("if", &c.condition);
                self.labeled("then", &c.then_branch);
                if let Some(otherwise) = &c.else_branch {
                    self.labeled("else", otherwise);
                }
            }
            Node::Loop(l) => {
                self.line("loop");
                self.nested(|p| {
                    if let Some(init) = &l.init {
                        p.labeled("init", init);
                    }
                    p.labeled("while", &l.condition);
                    if let Some(post) = &l.post {
                        p.labeled("post", post);
                    }
                    p.node(&l.body);
                });
            }
            Node::LoopBreak(b) => match b.kind {
                BreakKind::Break => self.line("break"),
                BreakKind::Continue => self.line("continue"),
            },
            Node::Return(r) => self.labeled("return", &r.value),
            Node::Throw(t) => self.labeled("throw", &t.value),
            Node::TryCatchFinally(t) => {
                self.labeled("try", &t.try_block);
                if let Some(catch) = &t.catch_block {
                    let name = t.exception_name.as_deref().unwrap_or("_");
                    self.labeled(&format!("catch {}", name), catch);
                }
                if let Some(finally) = &t.finally_block {
                    self.labeled("finally", finally);
                }
            }
            Node::Noop(_) => self.line("noop"),
        }
    }
}

impl PrettyPrint for Module {
    fn pretty_print(&self) -> String {
        let mut p = Printer::new();
        p.line(&format!("module {}", self.name));
        p.nested(|p| {
            for import in &self.imports {
                let marker = if import.implicit { " (implicit)" } else { "" };
                p.line(&format!("import {}{}", import.name, marker));
            }
            for s in &self.structs {
                p.line(&format!("struct {} {{{}}}", s.name, s.members.join(", ")));
            }
            for u in &self.unions {
                p.line(&format!("union {} {{{}}}", u.name, u.variants.join(", ")));
            }
            if let Some(init) = &self.initializer {
                p.function(init);
            }
            for function in &self.functions {
                p.function(function);
            }
            for (target, functions) in &self.augmentations {
                p.line(&format!("augment {}", target));
                p.nested(|p| functions.iter().for_each(|f| p.function(f)));
            }
            for (name, functions) in &self.named_augmentations {
                p.line(&format!("augmentation {}", name));
                p.nested(|p| functions.iter().for_each(|f| p.function(f)));
            }
            for (target, names) in &self.applications {
                p.line(&format!("augment {} with {}", target, names.join(", ")));
            }
        });
        p.out
    }
}

impl PrettyPrint for Function {
    fn pretty_print(&self) -> String {
        let mut p = Printer::new();
        p.function(self);
        p.out
    }
}

impl PrettyPrint for Node {
    fn pretty_print(&self) -> String {
        let mut p = Printer::new();
        p.node(self);
        p.out
    }
}

impl PrettyPrint for Block {
    fn pretty_print(&self) -> String {
        let mut p = Printer::new();
        p.block(self);
        p.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_is_id_independent() {
        let a = Node::binary(Operator::Plus, Node::constant(1), Node::lookup("x"));
        let b = Node::binary(Operator::Plus, Node::constant(1), Node::lookup("x"));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.pretty_print(), b.pretty_print());
    }

    #[test]
    fn test_dump_layout() {
        let node = Node::ret(Node::call("println", vec![Node::constant("hi")]));
        assert_eq!(
            node.pretty_print(),
            "return\n  call println\n    const \"hi\"\n"
        );
    }
}
