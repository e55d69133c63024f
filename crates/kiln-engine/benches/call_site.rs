use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kiln_engine::runtime::Object;
use kiln_engine::{CallSite, Callable, InvocationDescriptor, Registry, RuntimeModule, TypeInfo, Value};
use std::sync::Arc;

fn registry() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    registry.register_module(
        RuntimeModule::new("bench")
            .function(Callable::new("add", &["a", "b"], |args| {
                Ok(Value::Int(args[0].as_int().unwrap_or(0) + args[1].as_int().unwrap_or(0)))
            }))
            .function(Callable::new("sum", &["values"], |args| match &args[0] {
                Value::Array(values) => Ok(Value::Int(values.iter().filter_map(Value::as_int).sum())),
                _ => Ok(Value::Int(0)),
            }).variadic()),
    );
    registry
}

fn bench_function_hit(c: &mut Criterion) {
    let site = CallSite::new(registry(), InvocationDescriptor::function("bench", "add", 2));
    let args = [Value::Int(1), Value::Int(2)];
    site.invoke(&args).unwrap();

    c.bench_function("function_hit", |b| {
        b.iter(|| site.invoke(black_box(&args)).unwrap());
    });
}

fn bench_method_hit(c: &mut Criterion) {
    let registry = registry();
    let ty = registry.register_type(
        TypeInfo::new("bench.Counter")
            .field("n")
            .method(Callable::method("value", &[], |args| {
                Ok(args[0].as_object().and_then(|o| o.get("n")).unwrap_or(Value::Null))
            })),
    );
    let counter = Value::Object(Arc::new(Object::with_fields(ty, [("n".to_string(), Value::Int(7))])));
    let site = CallSite::new(registry, InvocationDescriptor::method("bench", "value", 1));
    let args = [counter];
    site.invoke(&args).unwrap();

    c.bench_function("method_hit", |b| {
        b.iter(|| site.invoke(black_box(&args)).unwrap());
    });
}

fn bench_varargs(c: &mut Criterion) {
    let mut group = c.benchmark_group("varargs");
    let registry = registry();

    for count in [1usize, 4, 16] {
        let site = CallSite::new(Arc::clone(&registry), InvocationDescriptor::function("bench", "sum", count));
        let args: Vec<Value> = (0..count as i64).map(Value::Int).collect();
        site.invoke(&args).unwrap();
        group.bench_with_input(BenchmarkId::new("collect", count), &args, |b, args| {
            b.iter(|| site.invoke(black_box(args)).unwrap());
        });
    }

    group.finish();
}

fn bench_constant(c: &mut Criterion) {
    let site = CallSite::new(
        registry(),
        InvocationDescriptor::function("bench", "add", 2).mark_constant(),
    );
    let args = [Value::Int(40), Value::Int(2)];
    site.invoke(&args).unwrap();

    c.bench_function("constant_read", |b| {
        b.iter(|| site.invoke(black_box(&args)).unwrap());
    });
}

criterion_group!(benches, bench_function_hit, bench_method_hit, bench_varargs, bench_constant);
criterion_main!(benches);
