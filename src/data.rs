//! Restaurant and user records, file loading and feature extraction

use crate::error::RecommendError;
use anyhow::Context;
use clap::ValueEnum;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Numeric attribute extracted from a restaurant
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    MeanRating,
    Price,
    NumRatings,
    Latitude,
    Longitude,
}

impl Feature {
    /// Every feature, in the order predictors are tried
    pub const ALL: [Feature; 5] = [
        Feature::MeanRating,
        Feature::Price,
        Feature::NumRatings,
        Feature::Latitude,
        Feature::Longitude,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::MeanRating => "mean-rating",
            Feature::Price => "price",
            Feature::NumRatings => "num-ratings",
            Feature::Latitude => "latitude",
            Feature::Longitude => "longitude",
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        let name = name.trim().to_ascii_lowercase().replace('_', "-");
        Feature::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Read this feature off a restaurant
    pub fn extract(self, restaurant: &Restaurant) -> f64 {
        match self {
            Feature::MeanRating => restaurant.mean_rating(),
            Feature::Price => f64::from(restaurant.price),
            Feature::NumRatings => restaurant.ratings.len() as f64,
            Feature::Latitude => restaurant.latitude(),
            Feature::Longitude => restaurant.longitude(),
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A restaurant record as stored in the restaurants file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// `[latitude, longitude]`
    pub location: [f64; 2],
    #[serde(default)]
    pub categories: Vec<String>,
    /// Price category, 1 (cheap) to 4 (expensive)
    pub price: u8,
    /// Review stars left by all users
    #[serde(default)]
    pub ratings: Vec<f64>,
    /// Health inspection score on a 0-100 scale
    #[serde(default)]
    pub inspection_score: Option<f64>,
}

impl Restaurant {
    pub fn latitude(&self) -> f64 {
        self.location[0]
    }

    pub fn longitude(&self) -> f64 {
        self.location[1]
    }

    /// Mean of all ratings, 0.0 for an unrated restaurant
    pub fn mean_rating(&self) -> f64 {
        if self.ratings.is_empty() {
            return 0.0;
        }
        self.ratings.iter().sum::<f64>() / self.ratings.len() as f64
    }

    pub fn has_category(&self, query: &str) -> bool {
        self.categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(query.trim()))
    }

    /// Feature vector in the order given by `features`
    pub fn feature_vector(&self, features: &[Feature]) -> Vec<f64> {
        features.iter().map(|f| f.extract(self)).collect()
    }
}

/// A single score a user gave a restaurant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Restaurant id
    pub restaurant: String,
    pub score: f64,
}

/// A user with their reviews and explicit preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    /// Explicit preferred value per feature, overriding what reviews imply
    #[serde(default)]
    pub preferences: BTreeMap<Feature, f64>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn score_for(&self, restaurant_id: &str) -> Option<f64> {
        self.reviews
            .iter()
            .find(|r| r.restaurant == restaurant_id)
            .map(|r| r.score)
    }

    pub fn has_reviewed(&self, restaurant_id: &str) -> bool {
        self.score_for(restaurant_id).is_some()
    }

    /// Mean of the user's own scores, `None` without reviews
    pub fn mean_score(&self) -> Option<f64> {
        if self.reviews.is_empty() {
            return None;
        }
        Some(self.reviews.iter().map(|r| r.score).sum::<f64>() / self.reviews.len() as f64)
    }

    /// Restaurants from `restaurants` that this user reviewed
    pub fn reviewed<'a>(&self, restaurants: &'a [Restaurant]) -> Vec<&'a Restaurant> {
        restaurants
            .iter()
            .filter(|r| self.has_reviewed(&r.id))
            .collect()
    }
}

/// Load and validate the restaurants file
///
/// # Arguments
/// * `path` - Path to a JSON array of restaurants
///
/// # Returns
/// * Restaurants in file order
pub fn load_restaurants(path: impl AsRef<Path>) -> crate::Result<Vec<Restaurant>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read restaurants from {}", path.display()))?;
    let restaurants: Vec<Restaurant> = serde_json::from_str(&text)
        .with_context(|| format!("malformed restaurants file {}", path.display()))?;

    validate_restaurants(&restaurants)
        .with_context(|| format!("invalid restaurants file {}", path.display()))?;

    info!(count = restaurants.len(), path = %path.display(), "loaded restaurants");
    Ok(restaurants)
}

/// Check ids are unique and numeric fields are in range
pub fn validate_restaurants(restaurants: &[Restaurant]) -> Result<(), RecommendError> {
    if restaurants.is_empty() {
        return Err(RecommendError::EmptyDataset);
    }

    let mut seen = HashSet::new();
    for r in restaurants {
        if !seen.insert(r.id.as_str()) {
            return Err(RecommendError::DuplicateRestaurant(r.id.clone()));
        }
        let invalid = |field: &'static str, reason: &str| RecommendError::InvalidField {
            id: r.id.clone(),
            field,
            reason: reason.to_string(),
        };
        if !(1..=4).contains(&r.price) {
            return Err(invalid("price", "must be between 1 and 4"));
        }
        if !r.location.iter().all(|c| c.is_finite()) {
            return Err(invalid("location", "coordinates must be finite"));
        }
        if r.ratings.iter().any(|s| !s.is_finite()) {
            return Err(invalid("ratings", "ratings must be finite"));
        }
        if let Some(score) = r.inspection_score {
            if !(0.0..=100.0).contains(&score) {
                return Err(invalid("inspection_score", "must be between 0 and 100"));
            }
        }
    }
    Ok(())
}

/// Load a user from a `.json` file or a flat preference file
pub fn load_user(path: impl AsRef<Path>) -> crate::Result<User> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read user file {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let user = if is_json {
        serde_json::from_str::<User>(&text)
            .with_context(|| format!("malformed user file {}", path.display()))?
    } else {
        let default_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        parse_user_file(&text, &default_id)
            .with_context(|| format!("malformed user file {}", path.display()))?
    };

    if let Some(bad) = user.reviews.iter().find(|r| !r.score.is_finite()) {
        anyhow::bail!("review score for {} is not a finite number", bad.restaurant);
    }

    debug!(user = %user.id, reviews = user.reviews.len(), "loaded user");
    Ok(user)
}

/// Parse the flat `key: value` user format
///
/// Recognised keys are `id`, `name`, `review: <restaurant id> = <score>` and
/// `prefer: <feature> = <value>`. `#` starts a comment.
pub fn parse_user_file(text: &str, default_id: &str) -> Result<User, RecommendError> {
    let mut user = User {
        id: default_id.to_string(),
        ..User::default()
    };

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let err = |reason: String| RecommendError::Parse {
            line: line_no,
            reason,
        };

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| err(format!("expected `key: value`, found `{line}`")))?;
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "id" => user.id = value.to_string(),
            "name" => user.name = Some(value.to_string()),
            "review" => {
                let (restaurant, score) = split_assignment(value).map_err(err)?;
                if user.has_reviewed(restaurant) {
                    return Err(err(format!("duplicate review for {restaurant}")));
                }
                user.reviews.push(Review {
                    restaurant: restaurant.to_string(),
                    score,
                });
            }
            "prefer" => {
                let (name, target) = split_assignment(value).map_err(err)?;
                let feature = Feature::from_name(name)
                    .ok_or_else(|| err(format!("unknown feature `{name}`")))?;
                user.preferences.insert(feature, target);
            }
            other => return Err(err(format!("unknown key `{other}`"))),
        }
    }

    if user.id.is_empty() {
        return Err(RecommendError::Parse {
            line: 0,
            reason: "user has no id".to_string(),
        });
    }
    Ok(user)
}

/// Split `lhs = number`
fn split_assignment(value: &str) -> Result<(&str, f64), String> {
    let (lhs, rhs) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected `<name> = <number>`, found `{value}`"))?;
    let lhs = lhs.trim();
    if lhs.is_empty() {
        return Err("missing name before `=`".to_string());
    }
    let number: f64 = rhs
        .trim()
        .parse()
        .map_err(|_| format!("invalid number `{}`", rhs.trim()))?;
    if !number.is_finite() {
        return Err(format!("invalid number `{}`", rhs.trim()));
    }
    Ok((lhs, number))
}

/// Every reviewed restaurant must exist in the dataset
pub fn validate_user(user: &User, restaurants: &[Restaurant]) -> Result<(), RecommendError> {
    let known: HashSet<&str> = restaurants.iter().map(|r| r.id.as_str()).collect();
    match user
        .reviews
        .iter()
        .find(|r| !known.contains(r.restaurant.as_str()))
    {
        Some(review) => Err(RecommendError::UnknownRestaurant(review.restaurant.clone())),
        None => Ok(()),
    }
}

/// Restaurants that list `query` as one of their categories
pub fn search(query: &str, restaurants: &[Restaurant]) -> Vec<Restaurant> {
    restaurants
        .iter()
        .filter(|r| r.has_category(query))
        .cloned()
        .collect()
}

/// Per-column standardisation to zero mean and unit variance
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Column standard deviations, 1.0 for constant columns
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(data: &Array2<f64>) -> Self {
        let n_features = data.ncols();
        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let scale = if data.nrows() == 0 {
            Array1::ones(n_features)
        } else {
            data.std_axis(Axis(0), 0.0)
                .mapv(|s| if s > f64::EPSILON { s } else { 1.0 })
        };
        Self { mean, scale }
    }

    pub fn transform(&self, data: Array2<f64>) -> Array2<f64> {
        (data - &self.mean) / &self.scale
    }

    pub fn transform_row(&self, row: &Array1<f64>) -> Array1<f64> {
        (row - &self.mean) / &self.scale
    }
}

/// Restaurant features laid out for clustering
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Column order
    pub features: Vec<Feature>,
    /// Restaurant id for each row
    pub ids: Vec<String>,
    /// Raw feature values (n_restaurants, n_features)
    pub raw: Array2<f64>,
    /// Standardised feature values used by k-means
    pub scaled: Array2<f64>,
    pub scaler: StandardScaler,
}

impl FeatureMatrix {
    /// Extract `features` from each restaurant and standardise the columns
    pub fn build(restaurants: &[Restaurant], features: &[Feature]) -> Result<Self, RecommendError> {
        if restaurants.is_empty() {
            return Err(RecommendError::EmptyDataset);
        }
        if features.is_empty() {
            return Err(RecommendError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let n_samples = restaurants.len();
        let n_features = features.len();
        let values: Vec<f64> = restaurants
            .iter()
            .flat_map(|r| r.feature_vector(features))
            .collect();
        let raw = Array2::from_shape_vec((n_samples, n_features), values).map_err(|_| {
            RecommendError::DimensionMismatch {
                expected: n_features,
                actual: 0,
            }
        })?;

        let scaler = StandardScaler::fit(&raw);
        let scaled = scaler.transform(raw.clone());
        debug!(rows = n_samples, cols = n_features, "built feature matrix");

        Ok(Self {
            features: features.to_vec(),
            ids: restaurants.iter().map(|r| r.id.clone()).collect(),
            raw,
            scaled,
            scaler,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.features.len()
    }

    /// Number of restaurants with pairwise different raw feature vectors
    pub fn distinct_rows(&self) -> usize {
        self.raw
            .outer_iter()
            .map(|row| row.iter().map(|v| v.to_bits()).collect::<Vec<u64>>())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Scale a raw feature vector into the clustering space
    pub fn scale(&self, raw: &[f64]) -> Result<Array1<f64>, RecommendError> {
        if raw.len() != self.dim() {
            return Err(RecommendError::DimensionMismatch {
                expected: self.dim(),
                actual: raw.len(),
            });
        }
        Ok(self.scaler.transform_row(&Array1::from_vec(raw.to_vec())))
    }
}
