use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use correlator_qa::prelude::*;

fn busy_event(n_tracks: u32) -> Event {
    let tracks = (0..n_tracks)
        .map(|id| {
            let phi = id as f64 * 0.37;
            let pt = 0.5 + (id % 17) as f64 * 0.3;
            let mut cluster_keys = vec![
                ClusterKey::new(Detector::Mvtx, 0, id),
                ClusterKey::new(Detector::Mvtx, 1, id),
                ClusterKey::new(Detector::Intt, 3, id / 2),
            ];
            cluster_keys.extend((7..40).map(|layer| ClusterKey::new(Detector::Tpc, layer, id)));
            Track {
                id,
                charge: 1,
                px: pt * phi.cos(),
                py: pt * phi.sin(),
                pz: 0.1 * (id % 7) as f64,
                x: 0.0,
                y: 0.0,
                z: 0.0,
                momentum_cov: Default::default(),
                chisq: 30.0,
                ndf: 25.0,
                vertex_id: 0,
                silicon_seed: Some(id),
                tpc_seed: Some(id),
                cluster_keys,
            }
        })
        .collect();
    Event {
        tracks,
        vertices: vec![Vertex {
            id: 0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }],
        ..Default::default()
    }
}

fn pair_benchmark(c: &mut Criterion) {
    let selection = TrackSelection::default();
    let mut group = c.benchmark_group("track pairs");
    for n_tracks in [10, 50, 200] {
        let event = busy_event(n_tracks);
        group.bench_with_input(BenchmarkId::from_parameter(n_tracks), &event, |b, event| {
            b.iter(|| make_track_pairs(black_box(event), black_box(&selection)))
        });
    }
    group.finish();
}

criterion_group!(benches, pair_benchmark);
criterion_main!(benches);
