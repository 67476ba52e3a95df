use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use wikispaces_core::config::{SpacesConfig, StoreConfig};
use wikispaces_core::core_space::testing::Harness;
use wikispaces_core::core_space::{NamespaceRepository, RequestContext, Space, SpaceFilter, SpaceSqlStore};

fn open_repository(dir: &TempDir, harness: &Harness, auto_group_sync: bool) -> NamespaceRepository {
    let config = StoreConfig { database_path: dir.path().join("bench.db"), ..StoreConfig::default() };
    let store = SpaceSqlStore::open(&config).unwrap();
    let spaces = SpacesConfig { auto_group_sync, ..SpacesConfig::default() };
    NamespaceRepository::new(store, spaces, harness.collaborators())
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("space_create");
    group.measurement_time(Duration::from_secs(10));

    for auto_group_sync in [false, true] {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(&["Alice"]);
        let repo = open_repository(&dir, &harness, auto_group_sync);
        let ctx = RequestContext::new(harness.directory.user("Alice").unwrap());
        let counter = AtomicU64::new(0);

        group.bench_with_input(BenchmarkId::new("group_sync", auto_group_sync), &auto_group_sync, |b, _| {
            b.iter(|| {
                let key = format!("Bench{}", counter.fetch_add(1, Ordering::Relaxed));
                let space = Space::from_values(key.clone(), key, "desc", ctx.actor.clone()).unwrap();
                black_box(repo.create(&ctx, &space).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_admin_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("space_admin_sync");

    for admins in [1usize, 10, 50] {
        let names: Vec<String> = (0..admins).map(|i| format!("User{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();

        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(&refs);
        let repo = open_repository(&dir, &harness, true);
        let ctx = RequestContext::new(harness.directory.user("User0").unwrap());
        let space = Space::from_values("Bench", "Bench", "desc", ctx.actor.clone()).unwrap();
        let id = repo.create(&ctx, &space).unwrap();

        let old = repo.get_space(id).unwrap().unwrap();
        let mut new = old.clone();
        new.set_administrators(names.clone());

        group.bench_with_input(BenchmarkId::new("admins", admins), &admins, |b, _| {
            b.iter(|| black_box(repo.update(&ctx, Some(&old), &new, true, false).unwrap()));
        });
    }

    group.finish();
}

fn bench_listing(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(&["Alice"]);
    let repo = open_repository(&dir, &harness, false);
    let ctx = RequestContext::new(harness.directory.user("Alice").unwrap());

    for i in 0..500 {
        let key = format!("List{}", i);
        let space = Space::from_values(key.clone(), key, "desc", ctx.actor.clone()).unwrap();
        repo.create(&ctx, &space).unwrap();
    }

    c.bench_function("space_list_all_500", |b| {
        b.iter(|| black_box(repo.list_all(SpaceFilter::All).unwrap()))
    });
}

criterion_group!(benches, bench_create, bench_admin_sync, bench_listing);
criterion_main!(benches);
