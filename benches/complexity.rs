use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use livescope::analysis::analyze;
use livescope::model::{Entry, HttpMethod, ResourceNode};
use livescope::routes::ResourceGraph;

const ROUTES_PER_ROUTER: usize = 8;

fn router(index: usize, mounts: impl IntoIterator<Item = usize>) -> ResourceNode {
    let id = format!("src/router{index}.ts@0");
    let mut entries: Vec<Entry> = (0..ROUTES_PER_ROUTER)
        .map(|route| Entry::Route {
            id: format!("src/router{index}.ts@{}", 100 + route * 40),
            method: HttpMethod::Get,
            path: format!("/r{route}"),
        })
        .collect();
    for (slot, target) in mounts.into_iter().enumerate() {
        entries.push(Entry::Reference {
            id: format!("src/router{index}.ts@{}", 1000 + slot * 40),
            target_id: format!("src/router{target}.ts@0"),
            path: format!("/sub{target}"),
            name: format!("router{target}"),
        });
    }
    ResourceNode {
        id,
        name: format!("router{index}"),
        file: format!("src/router{index}.ts"),
        position: 0,
        base_path: String::new(),
        entries,
    }
}

/// Binary tree of routers: node `i` mounts `2i+1` and `2i+2`.
fn tree_graph(size: usize) -> ResourceGraph {
    (0..size)
        .map(|i| router(i, [2 * i + 1, 2 * i + 2].into_iter().filter(|&child| child < size)))
        .collect()
}

/// Every router mounts its successor and the last one mounts the first, plus a few
/// shortcut edges back into the ring.
fn cyclic_graph(size: usize) -> ResourceGraph {
    (0..size)
        .map(|i| router(i, [(i + 1) % size, (i * 7 + 3) % size]))
        .collect()
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    for size in [16usize, 64, 256] {
        let tree = tree_graph(size);
        group.bench_with_input(BenchmarkId::new("tree", size), &tree, |b, graph| {
            b.iter(|| analyze(black_box(graph)).map(|node| node.id.len()))
        });
        let cyclic = cyclic_graph(size);
        group.bench_with_input(BenchmarkId::new("cyclic", size), &cyclic, |b, graph| {
            b.iter(|| analyze(black_box(graph)).map(|node| node.id.len()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_analyze);
criterion_main!(benches);
