use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use inspectra_auth::{
    reduce, visible_sites, Capability, CapabilitySet, EffectiveAccessGrant, GrantRole, RoleGrantRecord, Scope,
    SiteHierarchy, SiteNode,
};
use inspectra_core::{ClientId, MembershipId, RoleId, SiteId};

/// A tree where every site has `fanout` children, `depth` levels deep.
fn tree(fanout: usize, depth: usize) -> Vec<SiteNode> {
    let root = SiteId::new();
    let mut nodes = vec![SiteNode::root(root)];
    let mut level = vec![root];
    for _ in 0..depth {
        let mut next = Vec::with_capacity(level.len() * fanout);
        for parent in &level {
            for _ in 0..fanout {
                let id = SiteId::new();
                nodes.push(SiteNode::child(id, *parent));
                next.push(id);
            }
        }
        level = next;
    }
    nodes
}

fn records(count: usize) -> Vec<RoleGrantRecord> {
    (0..count)
        .map(|i| RoleGrantRecord {
            membership_id: MembershipId::new(),
            client_id: ClientId::new(),
            site_id: Some(SiteId::new()),
            role_id: RoleId::new(),
            role_name: format!("role-{i}"),
            scope: Scope::ALL[i % Scope::ALL.len()],
            capabilities: [Capability::ALL[i % Capability::ALL.len()]].into_iter().collect(),
            is_primary: i == 0,
            created_at: Utc::now(),
        })
        .collect()
}

fn bench_hierarchy_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("site_hierarchy_build");
    for (fanout, depth) in [(4, 3), (4, 5), (10, 3)] {
        let nodes = tree(fanout, depth);
        group.throughput(Throughput::Elements(nodes.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_sites", nodes.len())),
            &nodes,
            |b, nodes| b.iter(|| SiteHierarchy::build(black_box(nodes))),
        );
    }
    group.finish();
}

fn bench_visible_sites(c: &mut Criterion) {
    let nodes = tree(4, 5);
    let hierarchy = SiteHierarchy::build(&nodes).expect("tree is acyclic");
    let grant = EffectiveAccessGrant {
        scope: Scope::SiteGroup,
        capabilities: CapabilitySet::empty(),
        client_id: Some(ClientId::new()),
        site_id: Some(nodes[0].id),
        role: GrantRole::Ephemeral,
    };

    c.bench_function("visible_sites_site_group_root", |b| {
        b.iter(|| visible_sites(black_box(&grant), black_box(&hierarchy)))
    });
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce_role_grants");
    for count in [1usize, 8, 64] {
        let input = records(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| reduce(black_box(input)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_hierarchy_build, bench_visible_sites, bench_reduce);
criterion_main!(benches);
