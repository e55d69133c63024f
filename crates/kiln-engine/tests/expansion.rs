//! Macro expansion and compiler configuration end to end
//!
//! Tests cover:
//! - Macros expanded, resolved and folded in one compilation
//! - Recursive expansion reaching a fixed point
//! - Macro-free modules left untouched by expansion
//! - One compiler shared by threads compiling separate modules
//! - Options loaded from a TOML file

use kiln_engine::compiler::ir::{ConstValue, Operator};
use kiln_engine::compiler::{MacroExpander, MacroFailure, MacroOutput};
use kiln_engine::{
    CompileError, Compiler, CompilerOptions, FunctionBuilder, MacroDef, MacroRegistry, Module, Node, OptLevel,
    PrettyPrint,
};
use std::io::Write;
use std::sync::Arc;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn module_named(name: &str, build: impl FnOnce(&mut FunctionBuilder<'_>)) -> Module {
    let mut module = Module::new(name);
    let mut builder = FunctionBuilder::new(&mut module.tables, "main");
    build(&mut builder);
    let function = builder.build().unwrap();
    module.add_function(function);
    module
}

fn returned_constant(module: &Module) -> Option<ConstValue> {
    match module.functions[0].body.statements.last()? {
        Node::Return(ret) => ret.value.as_constant().cloned(),
        _ => None,
    }
}

/// `twice(x)` becomes `x * 2`; `countdown(n)` re-invokes itself down to 0
fn macros() -> MacroRegistry {
    let mut registry = MacroRegistry::new();
    registry.register(
        "kiln.macros.twice",
        MacroDef::new("twice", 1, |_, args| {
            let value = args.into_iter().next().ok_or_else(|| MacroFailure::new("missing argument"))?;
            Ok(MacroOutput::Node(Node::binary(Operator::Times, value, Node::constant(2))))
        }),
    );
    registry.register(
        "kiln.macros.countdown",
        MacroDef::new("countdown", 1, |_, args| match args[0].as_constant() {
            Some(ConstValue::Int(0)) => Ok(MacroOutput::Node(Node::constant("liftoff"))),
            Some(ConstValue::Int(n)) => Ok(MacroOutput::Node(Node::macro_call(
                "countdown",
                vec![Node::constant(*n - 1)],
            ))),
            _ => Err(MacroFailure::new("countdown needs an integer literal")),
        }),
    );
    registry
}

fn compiler() -> Compiler {
    Compiler::new(CompilerOptions::default(), Arc::new(macros()))
}

// =============================================================================
// EXPANSION
// =============================================================================

#[test]
fn test_macro_result_is_resolved_and_folded() {
    let mut module = module_named("demo", |f| {
        f.push(Node::ret(Node::macro_call(
            "twice",
            vec![Node::binary(Operator::Plus, Node::constant(20), Node::constant(1))],
        )));
    });
    compiler().compile(&mut module).unwrap();

    let dump = module.pretty_print();
    assert!(!dump.contains("macro"), "{}", dump);
    assert_eq!(returned_constant(&module), Some(ConstValue::Int(42)));
}

#[test]
fn test_recursive_expansion_reaches_fixed_point() {
    let mut module = module_named("demo", |f| {
        f.push(Node::ret(Node::macro_call("countdown", vec![Node::constant(5)])));
    });
    compiler().compile(&mut module).unwrap();
    assert_eq!(returned_constant(&module), Some(ConstValue::Str("liftoff".into())));
}

#[test]
fn test_expansion_depth_is_configurable() {
    let mut module = module_named("demo", |f| {
        f.push(Node::ret(Node::macro_call("countdown", vec![Node::constant(50)])));
    });
    let options = CompilerOptions {
        max_expansion_depth: 10,
        ..CompilerOptions::default()
    };
    let err = Compiler::new(options, Arc::new(macros()))
        .compile(&mut module)
        .unwrap_err();
    assert!(matches!(err, CompileError::ExpansionTooDeep { ref name, .. } if name == "countdown"), "{}", err);
}

#[test]
fn test_failing_macro_stops_compilation() {
    let mut module = module_named("demo", |f| {
        f.push(Node::ret(Node::macro_call("countdown", vec![Node::constant("soon")])));
    });
    let err = compiler().compile(&mut module).unwrap_err();
    assert!(matches!(err, CompileError::MacroFailure { ref name, .. } if name == "countdown"), "{}", err);
}

#[test]
fn test_module_without_macros_is_untouched() {
    let mut module = module_named("demo", |f| {
        f.param("n");
        f.var("acc", Node::constant(1));
        let lp = f.body().while_loop(Node::lookup("n"), |b| {
            b.assign("acc", Node::binary(Operator::Times, Node::lookup("acc"), Node::lookup("n")));
            b.push(Node::break_());
        });
        f.push(lp);
        f.push(Node::ret(Node::lookup("acc")));
    });
    let before = module.pretty_print();
    MacroExpander::new(Arc::new(macros()), &CompilerOptions::default())
        .expand_module(&mut module)
        .unwrap();
    assert_eq!(module.pretty_print(), before);
}

// =============================================================================
// SHARED COMPILER
// =============================================================================

#[test]
fn test_parallel_compilation_with_one_compiler() {
    let compiler = compiler();
    let results: Vec<Option<ConstValue>> = crossbeam::scope(|scope| {
        let handles: Vec<_> = (0..8i64)
            .map(|i| {
                let compiler = &compiler;
                scope.spawn(move |_| {
                    let mut module = module_named(&format!("worker{}", i), |f| {
                        f.push(Node::ret(Node::macro_call("twice", vec![Node::constant(i)])));
                    });
                    compiler.compile(&mut module).unwrap();
                    returned_constant(&module)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    let expected: Vec<Option<ConstValue>> = (0..8i64).map(|i| Some(ConstValue::Int(i * 2))).collect();
    assert_eq!(results, expected);
}

// =============================================================================
// OPTIONS
// =============================================================================

#[test]
fn test_options_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[compiler]
opt_level = "none"
max_expansion_depth = 16
default_imports = ["kiln.lang"]
"#
    )
    .unwrap();

    let options = CompilerOptions::from_file(file.path()).unwrap();
    assert_eq!(options.opt_level, OptLevel::None);
    assert_eq!(options.max_expansion_depth, 16);
    assert_eq!(options.default_imports, vec!["kiln.lang".to_string()]);
    assert!(options.recursive_expansion);
    assert_eq!(options.macro_fallback_namespace, "kiln.macros");

    let reloaded = CompilerOptions::from_toml_str(&options.to_toml_string().unwrap()).unwrap();
    assert_eq!(reloaded, options);
}

#[test]
fn test_invalid_options_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[compiler]\nmax_expansion_depth = 0").unwrap();
    assert!(CompilerOptions::from_file(file.path()).is_err());
    assert!(CompilerOptions::from_file(file.path().with_extension("missing")).is_err());
}
