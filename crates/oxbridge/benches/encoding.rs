// Encoding translation benchmarks
//
// Measures parsing of primitive, struct and method encodings, and how much
// the registered-layout lookup costs for `{Name}` references.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use oxbridge::runtime::{Translator, parse_signature, translate};
use std::hint::black_box;

fn bench_translate(c: &mut Criterion) {
    let mut group = c.benchmark_group("translate");
    for encoding in ["i", "^v", "@\"Object\"", "{CGPoint=dd}", "{CGRect={CGPoint=dd}{CGSize=dd}}"] {
        group.bench_with_input(BenchmarkId::from_parameter(encoding), encoding, |b, encoding| {
            b.iter(|| black_box(translate(black_box(encoding)).unwrap()))
        });
    }
    group.finish();
}

fn bench_signatures(c: &mut Criterion) {
    c.bench_function("signature_simple", |b| b.iter(|| black_box(parse_signature(black_box("v@:")).unwrap())));
    c.bench_function("signature_with_offsets", |b| {
        b.iter(|| black_box(parse_signature(black_box("@24@0:8@16")).unwrap()))
    });
    c.bench_function("signature_struct_args", |b| {
        b.iter(|| black_box(parse_signature(black_box("v@:{CGRect={CGPoint=dd}{CGSize=dd}}q")).unwrap()))
    });
}

fn bench_named_references(c: &mut Criterion) {
    let mut translator = Translator::new();
    let rect = translate("{CGRect=\"origin\"{CGPoint=dd}\"size\"{CGSize=dd}}").unwrap();
    translator.insert(rect.layout().unwrap().clone());

    c.bench_function("translate_registered_reference", |b| {
        b.iter(|| black_box(translator.translate(black_box("{CGRect}")).unwrap()))
    });
}

criterion_group!(benches, bench_translate, bench_signatures, bench_named_references);
criterion_main!(benches);
