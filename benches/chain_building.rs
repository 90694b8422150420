#![forbid(unsafe_code)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use chainquery::{InMemorySchema, Session, TableItem, ValueKind};

const CHAIN_LENGTHS: [usize; 3] = [4, 16, 64];

fn chain_schema(len: usize) -> InMemorySchema {
    let mut schema = InMemorySchema::new();
    for idx in 0..len {
        let name = format!("t{idx}");
        schema = schema
            .with_object(&name)
            .with_identity(&name, &format!("id{idx}"))
            .with_attribute(&name, &format!("v{idx}"), Some(ValueKind::Float));
    }
    for idx in 1..len {
        schema = schema.with_relation(&format!("t{}", idx - 1), &format!("t{idx}"), idx % 2 == 0, true);
    }
    schema
}

fn build_chain(session: &Session, len: usize) -> usize {
    let root = session.root();
    let start = root.get("t0s").expect("start");
    let mut current = start.clone();
    let mut total = start.get("v0").expect("v0");
    for idx in 1..len {
        current = current.traverse_to(&format!("t{idx}"), false).expect("traverse");
        let value = current.get(&format!("v{idx}")).expect("attribute");
        total = total.add(&value).expect("add");
    }
    let per_start = total.sum(Some(&start)).expect("sum");
    let table = start
        .select_many([TableItem::from(per_start), TableItem::from("id0")])
        .expect("table");
    table.names().len()
}

fn chain_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("query/chain");
    for len in CHAIN_LENGTHS {
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| {
                let session = Session::new(chain_schema(len));
                black_box(build_chain(&session, len))
            })
        });
    }
    group.finish();
}

fn wide_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("query/select_all_reachable");
    group.sample_size(20);
    let len = 32;
    group.bench_function("chain_32", |b| {
        b.iter(|| {
            let session = Session::new(chain_schema(len));
            let last = session.root().get(&format!("t{}s", len - 1)).expect("last");
            black_box(last.get("**").expect("table").names().len())
        })
    });
    group.finish();
}

criterion_group!(benches, chain_building, wide_table);
criterion_main!(benches);
