//! Benchmark suite for filter compilation and query execution

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use simpledata::query::{compile_filters, list};
use simpledata::store::{CollectionId, Document, DocumentStore, SledStore};
use tempfile::TempDir;

fn create_test_store(doc_count: usize) -> (TempDir, SledStore, CollectionId) {
    let dir = TempDir::new().unwrap();
    let store = SledStore::open(dir.path().join("db")).unwrap();
    let project = store.create_project("bench", "acct").unwrap();
    let coll = store.create_collection(project.id, "items").unwrap();

    for i in 0..doc_count {
        let mut data = Document::new();
        data.insert("seq".to_string(), json!(i));
        data.insert("price".to_string(), json!((i % 97) as f64 + 0.5));
        data.insert(
            "status".to_string(),
            json!(["open", "pending", "closed"][i % 3]),
        );
        data.insert("email".to_string(), json!(format!("user{}@example.com", i)));
        store.insert(coll.id, data).unwrap();
    }

    (dir, store, coll.id)
}

fn bench_compile_filters(c: &mut Criterion) {
    c.bench_function("compile_filters", |b| {
        b.iter(|| {
            compile_filters(black_box([
                ("price_gte", "10"),
                ("status_in", "open,pending"),
                ("email_regex", "@example\\.com$"),
                ("seq_lt", "5000"),
            ]))
            .unwrap()
        });
    });
}

fn bench_filtered_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtered_list");

    for size in [100, 1000, 10000] {
        let (_dir, store, coll) = create_test_store(size);
        let filters = compile_filters([("status", "open"), ("price_gt", "20")]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| list(&store, coll, black_box(&filters), 1, 50).unwrap());
        });
    }

    group.finish();
}

fn bench_unfiltered_count(c: &mut Criterion) {
    let (_dir, store, coll) = create_test_store(10_000);

    c.bench_function("count_10k", |b| {
        b.iter(|| store.count(black_box(coll), &[]).unwrap());
    });
}

criterion_group!(
    benches,
    bench_compile_filters,
    bench_filtered_list,
    bench_unfiltered_count
);
criterion_main!(benches);
