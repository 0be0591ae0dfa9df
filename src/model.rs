//! K-Means clustering of restaurants

use crate::data::FeatureMatrix;
use crate::error::RecommendError;
use linfa::metrics::SilhouetteScore;
use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::{Distance, L2Dist};
use ndarray::{s, Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use tracing::debug;

/// Tuning knobs for k-means
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansConfig {
    /// Maximum Lloyd iterations
    pub max_iters: u64,
    /// Convergence tolerance on centroid movement
    pub tolerance: f64,
    /// Seed for centroid initialisation, random when `None`
    pub seed: Option<u64>,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iters: 100,
            tolerance: 1e-4,
            seed: None,
        }
    }
}

/// One group of restaurants around a centroid
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Index into the fitted centroids
    pub index: usize,
    /// Row indices of member restaurants in the feature matrix
    pub members: Vec<usize>,
    /// Mean raw feature vector of the members
    pub centroid: Vec<f64>,
}

/// Fitted clustering of a feature matrix
#[derive(Debug)]
pub struct ClusterModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignment for every row
    pub labels: Array1<usize>,
    /// Cluster centroids in standardised space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl ClusterModel {
    /// Index of the centroid nearest to a standardised point
    pub fn predict(&self, point: &Array1<f64>) -> Result<usize, RecommendError> {
        if point.len() != self.centroids.ncols() {
            return Err(RecommendError::DimensionMismatch {
                expected: self.centroids.ncols(),
                actual: point.len(),
            });
        }
        Ok(find_closest(point.view(), &self.centroids))
    }

    /// Centroid indices ordered by distance to `point`, nearest first
    pub fn nearest_clusters(&self, point: &Array1<f64>) -> Result<Vec<usize>, RecommendError> {
        if point.len() != self.centroids.ncols() {
            return Err(RecommendError::DimensionMismatch {
                expected: self.centroids.ncols(),
                actual: point.len(),
            });
        }
        let mut ranked: Vec<(f64, usize)> = self
            .centroids
            .outer_iter()
            .enumerate()
            .map(|(i, c)| (L2Dist.distance(point.view(), c), i))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Ok(ranked.into_iter().map(|(_, i)| i).collect())
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Non-empty clusters with their members and raw-space centroids
    pub fn clusters(&self, matrix: &FeatureMatrix) -> Vec<Cluster> {
        (0..self.n_clusters)
            .filter_map(|index| {
                let members = self.members(index);
                if members.is_empty() {
                    return None;
                }
                let centroid = find_centroid(&matrix.raw, &members);
                Some(Cluster {
                    index,
                    members,
                    centroid,
                })
            })
            .collect()
    }

    /// Members of cluster `index`
    pub fn members(&self, index: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == index)
            .map(|(row, _)| row)
            .collect()
    }

    /// Mean silhouette coefficient over the first `sample_size` rows
    ///
    /// Zero when the sample covers fewer than two clusters.
    pub fn silhouette_sample(
        &self,
        features: &Array2<f64>,
        sample_size: usize,
    ) -> Result<f64, RecommendError> {
        let n = features.nrows().min(self.labels.len()).min(sample_size);
        let labels = self.labels.slice(s![..n]);
        if labels.iter().collect::<HashSet<_>>().len() < 2 {
            return Ok(0.0);
        }
        DatasetBase::new(features.slice(s![..n, ..]), labels)
            .silhouette_score()
            .map_err(|e| RecommendError::Clustering(e.to_string()))
    }
}

/// Fit K-Means on the standardised restaurant features
///
/// # Arguments
/// * `matrix` - Restaurant feature matrix
/// * `k` - Number of clusters, at least 1 and at most the number of distinct
///   feature vectors
/// * `config` - Iteration limit, tolerance and seed
///
/// # Returns
/// * Fitted `ClusterModel` with one label per restaurant
pub fn fit_kmeans(
    matrix: &FeatureMatrix,
    k: usize,
    config: &KMeansConfig,
) -> Result<ClusterModel, RecommendError> {
    let n_samples = matrix.scaled.nrows();
    if n_samples == 0 {
        return Err(RecommendError::EmptyDataset);
    }
    if k == 0 || k > n_samples {
        return Err(RecommendError::InvalidClusterCount {
            k,
            available: n_samples,
        });
    }
    let distinct = matrix.distinct_rows();
    if k > distinct {
        return Err(RecommendError::TooFewDistinctPoints { k, distinct });
    }

    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let dataset = DatasetBase::from(matrix.scaled.clone());

    let model = KMeans::params_with(k, rng, L2Dist)
        .max_n_iterations(config.max_iters)
        .tolerance(config.tolerance)
        .fit(&dataset)
        .map_err(|e| RecommendError::Clustering(e.to_string()))?;

    let labels = model.predict(&matrix.scaled);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(&matrix.scaled, &labels, &centroids);
    debug!(k, inertia, "fitted k-means");

    Ok(ClusterModel {
        n_clusters: k,
        labels,
        centroids,
        inertia,
    })
}

/// Index of the centroid closest to `point`; the first one wins ties
pub fn find_closest(point: ArrayView1<f64>, centroids: &Array2<f64>) -> usize {
    centroids
        .outer_iter()
        .map(|centroid| L2Dist.distance(point, centroid))
        .enumerate()
        .fold((0, f64::INFINITY), |best, (idx, d)| if d < best.1 { (idx, d) } else { best })
        .0
}

/// Mean of the given rows
pub fn find_centroid(features: &Array2<f64>, rows: &[usize]) -> Vec<f64> {
    let mut sum = vec![0.0; features.ncols()];
    for &row in rows {
        for (acc, value) in sum.iter_mut().zip(features.row(row).iter()) {
            *acc += value;
        }
    }
    let n = rows.len().max(1) as f64;
    sum.into_iter().map(|s| s / n).collect()
}

/// Within-cluster sum of squared distances to the assigned centroid
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    features
        .outer_iter()
        .zip(labels.iter())
        .filter(|(_, &cluster)| cluster < centroids.nrows())
        .map(|(row, &cluster)| L2Dist.rdistance(row, centroids.row(cluster)))
        .sum()
}
