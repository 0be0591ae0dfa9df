//! Cluster-based restaurant recommendation

use crate::data::{Feature, FeatureMatrix, Restaurant, User};
use crate::error::RecommendError;
use crate::model::ClusterModel;
use crate::predict::{predict_score, LinearModel};
use ndarray::Array1;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

/// How many clusters to draw from and how much to return
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendOptions {
    /// Number of nearest clusters whose members are candidates
    pub nearest: usize,
    /// Maximum recommendations returned, unlimited when `None`
    pub limit: Option<usize>,
    /// Drop restaurants the user already reviewed
    pub exclude_reviewed: bool,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            nearest: 1,
            limit: Some(10),
            exclude_reviewed: true,
        }
    }
}

/// A ranked recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub restaurant_id: String,
    pub name: String,
    pub cluster: usize,
    pub predicted_score: f64,
}

/// The user's preferred feature vector in raw feature units
///
/// Explicit preferences win. Other features take the mean over restaurants
/// the user scored at or above their own average, or over every reviewed
/// restaurant when none qualifies. `all_restaurants` is the whole dataset,
/// not a category subset, so reviews outside the candidates still count.
pub fn preference_vector(
    user: &User,
    all_restaurants: &[Restaurant],
    features: &[Feature],
) -> Result<Vec<f64>, RecommendError> {
    let reviewed = user.reviewed(all_restaurants);
    let liked: Vec<&Restaurant> = match user.mean_score() {
        Some(mean) => reviewed
            .iter()
            .copied()
            .filter(|r| user.score_for(&r.id).is_some_and(|s| s >= mean))
            .collect(),
        None => Vec::new(),
    };
    let basis = if liked.is_empty() { &reviewed } else { &liked };

    features
        .iter()
        .map(|&feature| {
            if let Some(&value) = user.preferences.get(&feature) {
                return Ok(value);
            }
            if basis.is_empty() {
                return Err(RecommendError::MissingPreference(feature.to_string()));
            }
            Ok(basis.iter().map(|r| feature.extract(r)).sum::<f64>() / basis.len() as f64)
        })
        .collect()
}

/// The user's preference vector scaled into the clustering space of `matrix`
pub fn preference_point(
    user: &User,
    all_restaurants: &[Restaurant],
    matrix: &FeatureMatrix,
) -> Result<Array1<f64>, RecommendError> {
    let preference = preference_vector(user, all_restaurants, &matrix.features)?;
    debug!(?preference, "user preference");
    matrix.scale(&preference)
}

/// Recommend restaurants from the clusters nearest to the user's preferences
///
/// # Arguments
/// * `user` - User whose reviews and preferences define the target point
/// * `all_restaurants` - Whole dataset, the basis for the preference point
/// * `candidates` - Restaurants in the same row order as `matrix`
/// * `matrix` - Feature matrix the clusters were fitted on
/// * `clusters` - Fitted clustering
/// * `model` - Score predictor used for ranking
/// * `options` - Cluster count, limit and filtering
///
/// # Returns
/// * Member restaurants ranked by predicted score, highest first
pub fn recommend(
    user: &User,
    all_restaurants: &[Restaurant],
    candidates: &[Restaurant],
    matrix: &FeatureMatrix,
    clusters: &ClusterModel,
    model: &LinearModel,
    options: &RecommendOptions,
) -> Result<Vec<Recommendation>, RecommendError> {
    if candidates.len() != matrix.len() || clusters.labels.len() != matrix.len() {
        return Err(RecommendError::DimensionMismatch {
            expected: matrix.len(),
            actual: candidates.len().min(clusters.labels.len()),
        });
    }

    let point = preference_point(user, all_restaurants, matrix)?;
    let chosen: Vec<usize> = clusters
        .nearest_clusters(&point)?
        .into_iter()
        .take(options.nearest.max(1))
        .collect();
    debug!(?chosen, "selected clusters");

    let mut ranked: Vec<Recommendation> = chosen
        .iter()
        .flat_map(|&cluster| {
            clusters
                .members(cluster)
                .into_iter()
                .map(move |row| (cluster, row))
        })
        .map(|(cluster, row)| (cluster, &candidates[row]))
        .filter(|(_, r)| !(options.exclude_reviewed && user.has_reviewed(&r.id)))
        .map(|(cluster, r)| Recommendation {
            restaurant_id: r.id.clone(),
            name: r.name.clone(),
            cluster,
            predicted_score: predict_score(r, model),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.predicted_score
            .partial_cmp(&a.predicted_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.restaurant_id.cmp(&b.restaurant_id))
    });
    if let Some(limit) = options.limit {
        ranked.truncate(limit);
    }
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::restaurant;
    use crate::data::{search, Review};
    use crate::model::{fit_kmeans, KMeansConfig};
    use crate::predict::{ScoreBounds, Target};
    use std::collections::HashSet;

    fn neighbourhoods() -> Vec<Restaurant> {
        let mut rs = vec![
            restaurant("n1", [0.0, 0.0], 1, &[]),
            restaurant("n2", [0.1, 0.0], 2, &[]),
            restaurant("n3", [0.0, 0.1], 3, &[]),
            restaurant("s1", [10.0, 10.0], 1, &[]),
            restaurant("s2", [10.1, 10.0], 4, &[]),
            restaurant("s3", [10.0, 10.1], 2, &[]),
        ];
        for (i, r) in rs.iter_mut().enumerate() {
            r.name = format!("{} place", (b'z' - i as u8) as char);
        }
        rs
    }

    fn price_model() -> LinearModel {
        LinearModel {
            feature: Feature::Price,
            slope: 10.0,
            intercept: 50.0,
            r_squared: 1.0,
            bounds: Target::Inspection.bounds(),
        }
    }

    fn user_with(reviews: &[(&str, f64)]) -> User {
        User {
            id: "u".to_string(),
            reviews: reviews
                .iter()
                .map(|(id, score)| Review {
                    restaurant: id.to_string(),
                    score: *score,
                })
                .collect(),
            ..User::default()
        }
    }

    fn fitted(rs: &[Restaurant], k: usize) -> (FeatureMatrix, ClusterModel) {
        let matrix = FeatureMatrix::build(rs, &[Feature::Latitude, Feature::Longitude]).unwrap();
        let config = KMeansConfig {
            seed: Some(7),
            ..KMeansConfig::default()
        };
        let model = fit_kmeans(&matrix, k, &config).unwrap();
        (matrix, model)
    }

    #[test]
    fn test_recommend_from_nearest_cluster() {
        let rs = neighbourhoods();
        let (matrix, clusters) = fitted(&rs, 2);
        let user = user_with(&[("s1", 5.0), ("n1", 1.0)]);

        let recs = recommend(
            &user,
            &rs,
            &rs,
            &matrix,
            &clusters,
            &price_model(),
            &RecommendOptions::default(),
        )
        .unwrap();

        let ids: Vec<&str> = recs.iter().map(|r| r.restaurant_id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s3"]);
        assert_eq!(recs[0].predicted_score, 90.0);
        assert_eq!(recs[1].predicted_score, 70.0);
    }

    #[test]
    fn test_explicit_preference_overrides_reviews() {
        let rs = neighbourhoods();
        let (matrix, clusters) = fitted(&rs, 2);
        let mut user = user_with(&[("s1", 5.0)]);
        user.preferences.insert(Feature::Latitude, 0.0);
        user.preferences.insert(Feature::Longitude, 0.0);

        let recs = recommend(
            &user,
            &rs,
            &rs,
            &matrix,
            &clusters,
            &price_model(),
            &RecommendOptions::default(),
        )
        .unwrap();

        let ids: Vec<&str> = recs.iter().map(|r| r.restaurant_id.as_str()).collect();
        assert_eq!(ids, vec!["n3", "n2", "n1"]);
    }

    #[test]
    fn test_recommendations_belong_to_dataset() {
        let rs = neighbourhoods();
        let (matrix, clusters) = fitted(&rs, 3);
        let user = user_with(&[("n2", 4.0)]);
        let options = RecommendOptions {
            nearest: 3,
            limit: None,
            exclude_reviewed: false,
        };

        let recs = recommend(&user, &rs, &rs, &matrix, &clusters, &price_model(), &options).unwrap();
        let known: HashSet<&str> = rs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(recs.len(), rs.len());
        assert!(recs.iter().all(|r| known.contains(r.restaurant_id.as_str())));
        assert!(recs
            .windows(2)
            .all(|w| w[0].predicted_score >= w[1].predicted_score));
    }

    #[test]
    fn test_ties_break_by_name() {
        let rs = neighbourhoods();
        let (matrix, clusters) = fitted(&rs, 1);
        let user = user_with(&[("n1", 3.0)]);
        let flat = LinearModel {
            slope: 0.0,
            intercept: 75.0,
            ..price_model()
        };
        let options = RecommendOptions {
            limit: Some(2),
            ..RecommendOptions::default()
        };

        let recs = recommend(&user, &rs, &rs, &matrix, &clusters, &flat, &options).unwrap();
        let names: Vec<&str> = recs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["u place", "v place"]);
    }

    #[test]
    fn test_missing_preference() {
        let rs = neighbourhoods();
        let (matrix, clusters) = fitted(&rs, 2);
        let user = user_with(&[]);

        let err = recommend(
            &user,
            &rs,
            &rs,
            &matrix,
            &clusters,
            &price_model(),
            &RecommendOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, RecommendError::MissingPreference("latitude".to_string()));
    }

    #[test]
    fn test_recommend_from_unreviewed_category() {
        let mut rs = vec![
            restaurant("a", [0.0, 0.0], 1, &[]),
            restaurant("b", [0.2, 0.0], 2, &[]),
            restaurant("c", [10.0, 10.0], 3, &[]),
            restaurant("d", [10.2, 10.0], 4, &[]),
        ];
        for r in &mut rs[2..] {
            r.categories = vec!["Thai".to_string()];
        }
        let thai = search("thai", &rs);
        assert_eq!(thai.len(), 2);

        let (matrix, clusters) = fitted(&thai, 1);
        let user = user_with(&[("a", 4.0)]);

        let point = preference_point(&user, &rs, &matrix).unwrap();
        assert_eq!(point.len(), 2);

        let recs = recommend(
            &user,
            &rs,
            &thai,
            &matrix,
            &clusters,
            &price_model(),
            &RecommendOptions::default(),
        )
        .unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.restaurant_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c"]);

        // the subset alone holds none of the user's reviews
        let err = recommend(
            &user,
            &thai,
            &thai,
            &matrix,
            &clusters,
            &price_model(),
            &RecommendOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, RecommendError::MissingPreference("latitude".to_string()));
    }

    #[test]
    fn test_recommendation_serialises_to_json() {
        let rec = Recommendation {
            restaurant_id: "s2".to_string(),
            name: "x place".to_string(),
            cluster: 1,
            predicted_score: 90.0,
        };
        let value = serde_json::to_value(vec![rec]).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "restaurant_id": "s2",
                "name": "x place",
                "cluster": 1,
                "predicted_score": 90.0
            }])
        );
    }

    #[test]
    fn test_preference_vector_uses_liked_restaurants() {
        let rs = neighbourhoods();

        // mean score is 3, so only s2 and n3 count as liked
        let user = user_with(&[("s2", 5.0), ("n3", 3.0), ("s1", 1.0)]);
        let pref = preference_vector(&user, &rs, &[Feature::Price]).unwrap();
        assert_eq!(pref, vec![3.5]);

        let bounds = ScoreBounds { min: 0.0, max: 1.0 };
        assert_eq!(bounds.clamp(f64::NAN), 0.0);
    }
}
