use crate::affinity::AffinityGraph;
use rayon::prelude::*;

/// Exact attractive forces over the affinity graph's nonzeros.
///
/// For every edge `(i, j, w)` adds `w · (yᵢ - yⱼ) / (1 + ‖yᵢ - yⱼ‖²)` to point `i`. Only the row
/// endpoint is updated; a symmetrized graph already carries the `(j, i)` entry.
pub fn attractive_forces(graph: &AffinityGraph, positions: &[f64], out: &mut [f64]) {
    let n = graph.n();
    let (xs, ys) = positions.split_at(n);
    let (ax, ay) = out.split_at_mut(n);

    ax.par_iter_mut()
        .zip(ay.par_iter_mut())
        .enumerate()
        .for_each(|(i, (fx, fy))| {
            let (mut sx, mut sy) = (0.0, 0.0);
            for (j, w) in graph.row(i) {
                let dx = xs[i] - xs[j];
                let dy = ys[i] - ys[j];
                let pq = w / (1.0 + dx * dx + dy * dy);
                sx += pq * dx;
                sy += pq * dy;
            }
            *fx = sx;
            *fy = sy;
        });
}
