// Dispatch benchmarks
//
// Measures:
// - Sends through a cached call frame vs a cold frame
// - Calls into bridge-built methods (trampoline round trip)
// - Inheritance depth of the looked-up method
// - Identity cache hits

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use oxbridge::{Class, Dispatchable, RuntimeContext, Value};
use std::hint::black_box;

fn build_class(ctx: &RuntimeContext, superclass: &Class, name: &str) -> Class {
    let mut pending = superclass.extend(ctx, name, 0).unwrap();
    pending
        .add_method("twice:", "q@:q", |_, _, args| Ok(Value::Int(args[0].as_i64().unwrap_or(0) * 2)))
        .unwrap();
    pending.register().unwrap()
}

fn bench_builtin_send(c: &mut Criterion) {
    let ctx = RuntimeContext::builtin();
    let object = ctx.class("Object").unwrap().unwrap();
    let obj = ctx.msg_send(&object, "new").unwrap().into_object().unwrap();

    // warm the frame cache
    obj.invoke(&ctx, "hash").unwrap();

    c.bench_function("builtin_send_hash", |b| b.iter(|| black_box(obj.invoke(&ctx, "hash").unwrap())));
    c.bench_function("builtin_send_is_equal", |b| {
        b.iter(|| black_box(obj.invoke(&ctx, [("isEqual", &obj)]).unwrap()))
    });
}

fn bench_cold_frame(c: &mut Criterion) {
    let object_ctx = RuntimeContext::builtin();
    let object = object_ctx.class("Object").unwrap().unwrap();
    let obj = object_ctx.msg_send(&object, "new").unwrap().into_object().unwrap();

    c.bench_function("send_with_cold_frame", |b| {
        b.iter(|| {
            // a fresh context starts with no frames
            let ctx = RuntimeContext::builtin();
            let obj = ctx.wrap(obj.as_ptr()).unwrap();
            black_box(obj.invoke(&ctx, "hash").unwrap())
        })
    });
}

fn bench_bridge_method(c: &mut Criterion) {
    let ctx = RuntimeContext::builtin();
    let object = ctx.class("Object").unwrap().unwrap();
    let doubler = build_class(&ctx, &object, "BenchDoubler");
    let obj = ctx.msg_send(&doubler, "new").unwrap().into_object().unwrap();

    c.bench_function("bridge_method_round_trip", |b| {
        b.iter(|| black_box(obj.invoke(&ctx, [("twice", black_box(21))]).unwrap()))
    });
}

fn bench_inheritance_depth(c: &mut Criterion) {
    let ctx = RuntimeContext::builtin();
    let object = ctx.class("Object").unwrap().unwrap();
    let base = build_class(&ctx, &object, "BenchDepth0");

    let mut group = c.benchmark_group("inheritance_depth");
    let mut leaf = base;
    let mut depth = 0;
    for target in [1usize, 5, 10] {
        while depth < target {
            depth += 1;
            leaf = leaf.extend(&ctx, &format!("BenchDepth{depth}"), 0).unwrap().register().unwrap();
        }
        let obj = ctx.msg_send(&leaf, "new").unwrap().into_object().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(target), &obj, |b, obj| {
            b.iter(|| black_box(obj.invoke(&ctx, [("twice", 1)]).unwrap()))
        });
    }
    group.finish();
}

fn bench_identity_cache(c: &mut Criterion) {
    let ctx = RuntimeContext::builtin();
    let object = ctx.class("Object").unwrap().unwrap();
    let obj = ctx.msg_send(&object, "new").unwrap().into_object().unwrap();
    let raw = obj.as_ptr();

    c.bench_function("wrap_cached_handle", |b| b.iter(|| black_box(ctx.wrap(black_box(raw)))));
}

criterion_group!(
    benches,
    bench_builtin_send,
    bench_cold_frame,
    bench_bridge_method,
    bench_inheritance_depth,
    bench_identity_cache
);
criterion_main!(benches);
