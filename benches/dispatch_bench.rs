use std::ffi::{c_char, c_int};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use discon_wrapper::{Payload, Registry, StaticLoader};

unsafe extern "C" fn touch(
    swap: *mut f32,
    fail: *mut c_int,
    _in_file: *mut c_char,
    _out_name: *mut c_char,
    _msg: *mut c_char,
) {
    *swap += 1.0;
    *fail = 0;
}

fn registry(capacity: usize) -> Registry<Arc<StaticLoader>> {
    let loader = StaticLoader::new().with_symbol("ctrl", "DISCON", touch);
    Registry::with_capacity(Arc::new(loader), capacity)
}

/// Benchmark the cost of one dispatch through the registry
fn bench_invoke(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoke");

    let registry = registry(8);
    registry.load(0, "ctrl", "DISCON").unwrap();
    let mut payload = Payload::with_capacity(164, 32);

    group.bench_function("payload", |b| {
        b.iter(|| registry.invoke_payload(black_box(0), &mut payload))
    });

    group.finish();
}

/// Benchmark load/unload cycles against table size
fn bench_load_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_cycle");

    for capacity in &[8usize, 1024, 8192] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), capacity, |b, &capacity| {
            let registry = registry(capacity);
            let conn = (capacity - 1) as i32;
            b.iter(|| {
                registry.load(black_box(conn), "ctrl", "DISCON").unwrap();
                registry.unload(conn).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark payload encoding and decoding
fn bench_payload_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload");

    let payload = Payload::with_capacity(164, 32);
    let encoded = payload.encode().unwrap();
    let mut target = Payload::default();

    group.bench_function("encode", |b| b.iter(|| black_box(&payload).encode()));
    group.bench_function("decode", |b| {
        b.iter(|| target.decode(black_box(&encoded)))
    });

    group.finish();
}

criterion_group!(benches, bench_invoke, bench_load_cycle, bench_payload_codec);
criterion_main!(benches);
