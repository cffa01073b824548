//! Seeded k-means partitioning.
//!
//! k-means++ seeding (greedy, with local trials) followed by Lloyd
//! iterations, restarted `n_init` times from one seeded RNG; the run with
//! the lowest inertia wins. Same input and config give the same labels.

use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use synopsis_core::{defaults, Error, Result};

/// Tuning knobs for [`kmeans`].
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// RNG seed shared by every restart.
    pub seed: u64,
    /// Number of restarts.
    pub n_init: usize,
    /// Maximum Lloyd iterations per restart.
    pub max_iter: usize,
    /// Relative tolerance on total center shift, scaled by mean feature
    /// variance.
    pub tolerance: f64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            seed: defaults::KMEANS_SEED,
            n_init: defaults::KMEANS_N_INIT,
            max_iter: defaults::KMEANS_MAX_ITER,
            tolerance: defaults::KMEANS_TOLERANCE,
        }
    }
}

impl KMeansConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }
}

/// Outcome of the best restart.
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// One label per input vector, in input order. Labels are numbered by
    /// first appearance, so the first vector is always in cluster 0.
    pub labels: Vec<usize>,
    /// Cluster centers, row `i` for label `i`.
    pub centers: Array2<f64>,
    /// Sum of squared distances to the assigned centers.
    pub inertia: f64,
    /// Lloyd iterations taken by the winning restart.
    pub n_iter: usize,
}

/// Partition `vectors` into `k` clusters.
///
/// Fails with a validation error for `k == 0`, `k` larger than the number
/// of vectors, no vectors at all, or vectors of differing dimension.
pub fn kmeans(vectors: &[Vec<f32>], k: usize, config: &KMeansConfig) -> Result<KMeansResult> {
    let x = to_matrix(vectors)?;
    let n_samples = x.nrows();

    if k == 0 {
        return Err(Error::Validation("k must be positive".into()));
    }
    if k > n_samples {
        return Err(Error::Validation(format!(
            "k ({k}) exceeds the number of vectors ({n_samples})"
        )));
    }

    // Tolerance is relative to the spread of the data.
    let mean_variance = x.var_axis(Axis(0), 0.0).mean().unwrap_or(0.0);
    let tol = config.tolerance * mean_variance;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<KMeansResult> = None;

    for _ in 0..config.n_init.max(1) {
        let centers_init = kmeans_plus_plus(&x, k, &mut rng);
        let (labels, centers, inertia, n_iter) = single_lloyd(&x, &centers_init, config.max_iter, tol);

        if best.as_ref().map_or(true, |b| inertia < b.inertia) {
            best = Some(KMeansResult {
                labels,
                centers,
                inertia,
                n_iter,
            });
        }
    }

    let best = best.ok_or_else(|| Error::Internal("k-means produced no result".into()))?;
    Ok(canonicalize(best))
}

fn to_matrix(vectors: &[Vec<f32>]) -> Result<Array2<f64>> {
    let Some(first) = vectors.first() else {
        return Err(Error::Validation("no vectors to cluster".into()));
    };
    let n_features = first.len();
    if n_features == 0 {
        return Err(Error::Validation("vectors must not be empty".into()));
    }

    let mut data = Vec::with_capacity(vectors.len() * n_features);
    for (i, v) in vectors.iter().enumerate() {
        if v.len() != n_features {
            return Err(Error::Validation(format!(
                "mixed vector dimensions: vector {i} has {} components, expected {n_features}",
                v.len()
            )));
        }
        data.extend(v.iter().map(|&c| f64::from(c)));
    }

    Array2::from_shape_vec((vectors.len(), n_features), data)
        .map_err(|e| Error::Internal(format!("vector matrix: {e}")))
}

fn sq_dist(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Greedy k-means++: each new center is the best of several candidates
/// sampled proportionally to squared distance from the chosen centers.
fn kmeans_plus_plus(x: &Array2<f64>, n_clusters: usize, rng: &mut StdRng) -> Array2<f64> {
    let n_samples = x.nrows();
    let n_local_trials = 2 + (n_clusters as f64).ln() as usize;
    let mut centers = Array2::<f64>::zeros((n_clusters, x.ncols()));

    let first = rng.gen_range(0..n_samples);
    centers.row_mut(0).assign(&x.row(first));
    let mut closest_dist_sq: Array1<f64> = x
        .rows()
        .into_iter()
        .map(|row| sq_dist(row, x.row(first)))
        .collect();
    let mut current_pot = closest_dist_sq.sum();

    for c in 1..n_clusters {
        let mut best_id = 0;
        let mut best_dists = Array1::<f64>::zeros(0);
        let mut best_pot = f64::INFINITY;

        for _ in 0..n_local_trials {
            let candidate = if current_pot > 0.0 {
                sample_weighted(&closest_dist_sq, rng.gen::<f64>() * current_pot)
            } else {
                rng.gen_range(0..n_samples)
            };

            let dists: Array1<f64> = x
                .rows()
                .into_iter()
                .zip(closest_dist_sq.iter())
                .map(|(row, &closest)| sq_dist(row, x.row(candidate)).min(closest))
                .collect();
            let pot = dists.sum();

            if pot < best_pot {
                best_id = candidate;
                best_pot = pot;
                best_dists = dists;
            }
        }

        centers.row_mut(c).assign(&x.row(best_id));
        closest_dist_sq = best_dists;
        current_pot = best_pot;
    }

    centers
}

/// Index whose cumulative weight first exceeds `target`.
fn sample_weighted(weights: &Array1<f64>, target: f64) -> usize {
    let mut cumulative = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w;
        if cumulative > target {
            return i;
        }
    }
    weights.len() - 1
}

/// Nearest center per sample; ties go to the lowest center index.
fn assign_labels(x: &Array2<f64>, centers: &Array2<f64>) -> Vec<usize> {
    x.rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (c, center) in centers.rows().into_iter().enumerate() {
                let d = sq_dist(row, center);
                if d < best_dist {
                    best = c;
                    best_dist = d;
                }
            }
            best
        })
        .collect()
}

/// Mean of each cluster's members. An empty cluster keeps its old center.
fn update_centers(x: &Array2<f64>, labels: &[usize], centers_old: &Array2<f64>) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(centers_old.raw_dim());
    let mut counts = vec![0usize; centers_old.nrows()];

    for (row, &label) in x.rows().into_iter().zip(labels) {
        let mut target = sums.row_mut(label);
        target += &row;
        counts[label] += 1;
    }

    for (cluster, &count) in counts.iter().enumerate() {
        if count > 0 {
            sums.row_mut(cluster).mapv_inplace(|v| v / count as f64);
        } else {
            sums.row_mut(cluster).assign(&centers_old.row(cluster));
        }
    }
    sums
}

fn inertia(x: &Array2<f64>, centers: &Array2<f64>, labels: &[usize]) -> f64 {
    x.rows()
        .into_iter()
        .zip(labels)
        .map(|(row, &label)| sq_dist(row, centers.row(label)))
        .sum()
}

/// One Lloyd run. Returns (labels, centers, inertia, iterations).
fn single_lloyd(
    x: &Array2<f64>,
    centers_init: &Array2<f64>,
    max_iter: usize,
    tol: f64,
) -> (Vec<usize>, Array2<f64>, f64, usize) {
    let mut centers = centers_init.clone();
    let mut labels_old: Vec<usize> = Vec::new();
    let mut iterations = 0;

    for i in 0..max_iter {
        iterations = i + 1;
        let labels = assign_labels(x, &centers);
        let centers_new = update_centers(x, &labels, &centers);

        let shift: f64 = centers
            .rows()
            .into_iter()
            .zip(centers_new.rows())
            .map(|(a, b)| sq_dist(a, b))
            .sum();
        centers = centers_new;

        if labels == labels_old || shift <= tol {
            break;
        }
        labels_old = labels;
    }

    // Labels must reflect the final centers.
    let labels = assign_labels(x, &centers);
    let inertia = inertia(x, &centers, &labels);
    (labels, centers, inertia, iterations)
}

/// Renumber clusters by first appearance in input order.
fn canonicalize(result: KMeansResult) -> KMeansResult {
    let k = result.centers.nrows();
    let mut mapping: Vec<Option<usize>> = vec![None; k];
    let mut next = 0;
    for &label in &result.labels {
        if mapping[label].is_none() {
            mapping[label] = Some(next);
            next += 1;
        }
    }
    // Clusters that ended up empty go last, in their original order.
    for slot in mapping.iter_mut() {
        if slot.is_none() {
            *slot = Some(next);
            next += 1;
        }
    }
    let mapping: Vec<usize> = mapping.into_iter().map(|m| m.unwrap_or(0)).collect();

    let mut centers = Array2::<f64>::zeros(result.centers.raw_dim());
    for (old, &new) in mapping.iter().enumerate() {
        centers.row_mut(new).assign(&result.centers.row(old));
    }

    KMeansResult {
        labels: result.labels.iter().map(|&l| mapping[l]).collect(),
        centers,
        inertia: result.inertia,
        n_iter: result.n_iter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 2.0],
            vec![10.0, 2.0],
            vec![1.0, 4.0],
            vec![10.0, 4.0],
            vec![1.0, 0.0],
            vec![10.0, 0.0],
        ]
    }

    #[test]
    fn test_two_separated_groups() {
        let result = kmeans(&two_groups(), 2, &KMeansConfig::default()).unwrap();

        assert_eq!(result.labels, vec![0, 1, 0, 1, 0, 1]);
        assert!((result.inertia - 16.0).abs() < 1e-8, "inertia={}", result.inertia);
        assert!((result.centers[(0, 0)] - 1.0).abs() < 1e-8);
        assert!((result.centers[(1, 0)] - 10.0).abs() < 1e-8);
        assert!(result.n_iter > 0);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let mut data = Vec::new();
        for i in 0..40 {
            let t = i as f32 * 0.37;
            data.push(vec![t.sin() * 5.0, t.cos() * 3.0, (i % 7) as f32]);
        }

        let a = kmeans(&data, 4, &KMeansConfig::default()).unwrap();
        let b = kmeans(&data, 4, &KMeansConfig::default()).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.inertia, b.inertia);
    }

    #[test]
    fn test_labels_numbered_by_first_appearance() {
        let result = kmeans(&two_groups(), 2, &KMeansConfig::default().with_seed(7)).unwrap();
        assert_eq!(result.labels[0], 0);
    }

    #[test]
    fn test_k_equals_n_gives_singletons() {
        let data = vec![vec![0.0], vec![5.0], vec![9.0]];
        let result = kmeans(&data, 3, &KMeansConfig::default()).unwrap();
        assert_eq!(result.labels, vec![0, 1, 2]);
        assert!(result.inertia.abs() < 1e-12);
    }

    #[test]
    fn test_identical_points_do_not_panic() {
        let data = vec![vec![1.0, 1.0]; 5];
        let result = kmeans(&data, 2, &KMeansConfig::default()).unwrap();
        assert_eq!(result.labels.len(), 5);
        assert!(result.inertia.abs() < 1e-12);
    }

    #[test]
    fn test_validation_errors() {
        let data = two_groups();
        assert!(matches!(
            kmeans(&data, 0, &KMeansConfig::default()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            kmeans(&data, 7, &KMeansConfig::default()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            kmeans(&[], 1, &KMeansConfig::default()),
            Err(Error::Validation(_))
        ));

        let mixed = vec![vec![1.0, 2.0], vec![1.0]];
        let err = kmeans(&mixed, 1, &KMeansConfig::default()).unwrap_err();
        assert!(err.to_string().contains("mixed vector dimensions"));
    }

    #[test]
    fn test_empty_cluster_keeps_old_center() {
        let x = array![[0.0], [1.0]];
        let old = array![[0.5], [100.0]];
        let labels = assign_labels(&x, &old);
        assert_eq!(labels, vec![0, 0]);

        let updated = update_centers(&x, &labels, &old);
        assert_eq!(updated, array![[0.5], [100.0]]);
    }

    #[test]
    fn test_sample_weighted() {
        let w = array![0.0, 1.0, 3.0];
        assert_eq!(sample_weighted(&w, 0.5), 1);
        assert_eq!(sample_weighted(&w, 1.5), 2);
        assert_eq!(sample_weighted(&w, 10.0), 2);
    }
}
