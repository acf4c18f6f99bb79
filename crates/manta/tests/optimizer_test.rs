use manta::forces::brute_force_repulsion;
use manta::integrate::{GROWTH_BOUND_START, GROWTH_BOUND_STEP, update_gain};
use manta::{AffinityGraph, Error, Initialization, Optimizer, Params, embed};

/// Every point linked to its `k` successors on a ring, symmetrized and normalized.
fn ring_graph(n: usize, k: usize) -> AffinityGraph {
    let mut triplets = Vec::new();
    for i in 0..n {
        for d in 1..=k {
            triplets.push((i as u32, ((i + d) % n) as u32, 1.0));
        }
    }
    AffinityGraph::symmetrize(n, &triplets).unwrap()
}

fn seeded(max_iter: usize) -> Params {
    Params {
        max_iter,
        random_state: 7,
        ..Default::default()
    }
}

#[test]
fn four_corner_square_matches_brute_force_forces() {
    let n = 4;
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    for i in 0..n as u32 {
        for j in 0..n as u32 {
            if i != j {
                rows.push(i);
                cols.push(j);
            }
        }
    }
    let mut graph = AffinityGraph::from_coo(n, vec![0.25; 12], cols, rows, 12).unwrap();
    let initial = [0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0];
    let params = Params {
        theta: 0.0,
        early_exaggeration: 1.0,
        max_iter: 1,
        init: Initialization::Provided,
        ..Default::default()
    };

    let mut opt = Optimizer::new(&mut graph, &initial, &params).unwrap();
    let report = opt.step().unwrap();

    let (exact_rep, exact_z) = brute_force_repulsion(&initial, params.epssq);
    assert!((report.z - exact_z).abs() < 1e-12, "{} vs {exact_z}", report.z);
    for (a, e) in opt.embedding().repulsion().iter().zip(&exact_rep) {
        assert!((a - e).abs() < 1e-12, "{a} vs {e}");
    }

    let mut exact_attr = [0.0; 8];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let dx = initial[i] - initial[j];
            let dy = initial[n + i] - initial[n + j];
            let pq = 0.25 / (1.0 + dx * dx + dy * dy);
            exact_attr[i] += pq * dx;
            exact_attr[n + i] += pq * dy;
        }
    }
    for (a, e) in opt.embedding().attraction().iter().zip(&exact_attr) {
        assert!((a - e).abs() < 1e-12, "{a} vs {e}");
    }

    // Replay the update rule by hand.
    let mut expected = [0.0; 8];
    for k in 0..8 {
        let grad = exact_attr[k] - exact_rep[k] / exact_z;
        let gain = update_gain(1.0, grad, 0.0, params.min_gain);
        let v = -params.pre_learning_rate * gain * grad;
        expected[k] = (initial[k] + v).clamp(-GROWTH_BOUND_START, GROWTH_BOUND_START);
    }
    let mx = expected[..4].iter().sum::<f64>() / 4.0;
    let my = expected[4..].iter().sum::<f64>() / 4.0;
    for k in 0..4 {
        expected[k] -= mx;
        expected[4 + k] -= my;
    }
    for (a, e) in opt.embedding().positions().iter().zip(&expected) {
        assert!((a - e).abs() < 1e-9, "{a} vs {e}");
    }
    drop(opt);

    let mut positions = initial;
    let mut graph2 = graph.clone();
    let summary = embed(&mut graph2, &mut positions, &params).unwrap();
    assert_eq!(summary.iterations, 1);
}

#[test]
fn embedding_is_centered_after_every_iteration() {
    let mut graph = ring_graph(150, 3);
    graph.scale(12.0);
    let positions = vec![0.0; 300];
    let mut opt = Optimizer::new(&mut graph, &positions, &seeded(40)).unwrap();
    for _ in 0..40 {
        opt.step().unwrap();
        let (mx, my) = opt.embedding().mean();
        assert!(mx.abs() < 1e-12 && my.abs() < 1e-12, "mean ({mx}, {my})");
    }
}

#[test]
fn same_seed_gives_identical_embeddings() {
    let run = || {
        let mut graph = ring_graph(300, 4);
        graph.scale(12.0);
        let mut positions = vec![0.0; 600];
        embed(&mut graph, &mut positions, &seeded(30)).unwrap();
        positions
    };
    let a = run();
    let b = run();
    assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
}

#[test]
fn growth_bound_widens_by_a_fixed_step() {
    let mut graph = ring_graph(64, 2);
    let positions = vec![0.0; 128];
    let mut opt = Optimizer::new(&mut graph, &positions, &seeded(10)).unwrap();
    let mut prev = None;
    for k in 0..10 {
        let report = opt.step().unwrap();
        let expected = GROWTH_BOUND_START + k as f64 * GROWTH_BOUND_STEP;
        assert!((report.growth_bound - expected).abs() < 1e-9);
        if let Some(p) = prev {
            assert!(report.growth_bound > p);
        }
        prev = Some(report.growth_bound);
    }
    assert!(opt.growth_bound() > prev.unwrap());
}

#[test]
fn exaggeration_is_removed_exactly_once() {
    let factor = 12.0;
    let mut graph = ring_graph(100, 3);
    let original = graph.weight_sum();
    graph.scale(factor);
    let exaggerated = graph.weight_sum();

    let params = Params {
        early_exaggeration: factor,
        exaggeration_iter: 5,
        ..seeded(15)
    };
    let positions = vec![0.0; 200];
    let mut opt = Optimizer::new(&mut graph, &positions, &params).unwrap();
    for it in 0..15 {
        opt.step().unwrap();
        let sum = opt.graph().weight_sum();
        if it < 5 {
            assert!((sum - exaggerated).abs() < 1e-12);
        } else {
            assert!((sum * factor - exaggerated).abs() < 1e-9);
            assert!((sum - original).abs() < 1e-9);
        }
    }
}

#[test]
fn gains_respect_the_floor_and_cells_respect_capacity() {
    let mut graph = ring_graph(200, 5);
    graph.scale(12.0);
    let params = Params {
        min_gain: 0.05,
        ..seeded(60)
    };
    let positions = vec![0.0; 400];
    let mut opt = Optimizer::new(&mut graph, &positions, &params).unwrap();
    for _ in 0..60 {
        let report = opt.step().unwrap();
        assert!(report.cells <= opt.tree().capacity());
        assert!(opt.embedding().gains().iter().all(|g| *g >= 0.05));
    }
}

#[test]
fn disconnected_cliques_separate() {
    let n = 80;
    let mut triplets = Vec::new();
    for i in 0..n {
        for j in 0..n {
            if i != j && (i < n / 2) == (j < n / 2) {
                triplets.push((i as u32, j as u32, 1.0));
            }
        }
    }
    let mut graph = AffinityGraph::symmetrize(n, &triplets).unwrap();
    graph.scale(12.0);
    let mut positions = vec![0.0; 2 * n];
    let params = Params {
        exaggeration_iter: 100,
        ..seeded(250)
    };
    embed(&mut graph, &mut positions, &params).unwrap();

    let centroid = |range: std::ops::Range<usize>| {
        let len = range.len() as f64;
        let (sx, sy) = range.fold((0.0, 0.0), |(sx, sy), i| {
            (sx + positions[i], sy + positions[n + i])
        });
        (sx / len, sy / len)
    };
    let a = centroid(0..n / 2);
    let b = centroid(n / 2..n);
    let dist = |i: usize, (cx, cy): (f64, f64)| {
        ((positions[i] - cx).powi(2) + (positions[n + i] - cy).powi(2)).sqrt()
    };
    for i in 0..n {
        let (own, other) = if i < n / 2 { (a, b) } else { (b, a) };
        assert!(dist(i, own) < dist(i, other), "point {i} sits nearer the other clique");
    }
}

#[test]
fn contract_violations_fail_fast() {
    let mut single = AffinityGraph::from_coo(1, vec![], vec![], vec![], 0).unwrap();
    assert!(matches!(
        Optimizer::new(&mut single, &[0.0, 0.0], &Params::default()),
        Err(Error::TooFewPoints { n: 1 })
    ));

    let mut graph = ring_graph(10, 1);
    assert!(matches!(
        Optimizer::new(&mut graph, &[0.0; 5], &Params::default()),
        Err(Error::PositionBufferLength { expected: 20, actual: 5 })
    ));

    let bad = Params {
        theta: -1.0,
        ..Default::default()
    };
    assert!(matches!(
        Optimizer::new(&mut graph, &[0.0; 20], &bad),
        Err(Error::InvalidParameter { name: "theta", .. })
    ));
}

#[test]
fn tiny_node_capacity_aborts_the_run() {
    let mut graph = ring_graph(50, 2);
    let mut positions = vec![0.0; 100];
    let params = Params {
        node_capacity: Some(1),
        ..seeded(3)
    };
    let err = embed(&mut graph, &mut positions, &params).unwrap_err();
    assert!(matches!(err, Error::NodeCapacityExceeded { capacity: 1 }), "{err:?}");
}

#[test]
fn duplicated_seed_points_embed() {
    let n = 6;
    let mut graph = ring_graph(n, 2);
    let mut positions = vec![0.0, 0.0, 1.0, -1.0, 2.0, 0.5, 0.0, 0.0, 1.0, 0.5, -1.0, 2.0];
    let params = Params {
        init: Initialization::Provided,
        ..seeded(5)
    };
    let summary = embed(&mut graph, &mut positions, &params).unwrap();
    assert_eq!(summary.iterations, 5);
    assert!(positions.iter().all(|v| v.is_finite()));
}

#[test]
fn many_duplicates_fit_the_default_capacity() {
    let n = 400;
    let mut graph = ring_graph(n, 3);
    graph.scale(12.0);
    // Every point shares its coordinates with its partner `i ± n/2`.
    let mut positions = vec![0.0; 2 * n];
    for i in 0..n / 2 {
        let t = i as f64 * 0.7;
        positions[i] = t.cos() * (1.0 + 0.01 * t);
        positions[n + i] = t.sin() * (1.0 + 0.01 * t);
        positions[i + n / 2] = positions[i];
        positions[n + i + n / 2] = positions[n + i];
    }
    let params = Params {
        init: Initialization::Provided,
        ..seeded(20)
    };
    let mut opt = Optimizer::new(&mut graph, &positions, &params).unwrap();
    for _ in 0..20 {
        let report = opt.step().unwrap();
        assert!(report.cells <= opt.tree().capacity());
    }
    assert!(opt.embedding().positions().iter().all(|v| v.is_finite()));
}

#[test]
fn fully_coincident_seed_runs() {
    let mut graph = ring_graph(32, 2);
    let mut positions = vec![0.0; 64];
    let params = Params {
        init: Initialization::Provided,
        ..seeded(3)
    };
    embed(&mut graph, &mut positions, &params).unwrap();
    assert!(positions.iter().all(|v| v.is_finite()));
}

#[test]
fn spread_out_seed_keeps_a_negative_normalization() {
    let mut graph = AffinityGraph::symmetrize(3, &[(0, 1, 1.0)]).unwrap();
    let positions = [0.0, 30.0, 60.0, 0.0, 0.0, 0.0];
    let params = Params {
        early_exaggeration: 1.0,
        init: Initialization::Provided,
        ..seeded(5)
    };
    let mut opt = Optimizer::new(&mut graph, &positions, &params).unwrap();
    let first = opt.step().unwrap();
    assert!(first.z < 0.0 && first.z.is_finite(), "Z = {}", first.z);
    for _ in 1..5 {
        opt.step().unwrap();
    }
    assert!(opt.embedding().positions().iter().all(|v| v.is_finite()));
}
