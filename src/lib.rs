//! dinecluster: restaurant recommendations from k-means clustering
//!
//! Restaurants are clustered on numeric features (location by default), a
//! single-feature least-squares line predicts scores, and the members of the
//! clusters nearest to a user's preferences are ranked by predicted score.

pub mod cli;
pub mod data;
pub mod error;
pub mod model;
pub mod predict;
pub mod recommend;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{
    load_restaurants, load_user, search, validate_user, Feature, FeatureMatrix, Restaurant,
    Review, User,
};
pub use error::RecommendError;
pub use model::{fit_kmeans, Cluster, ClusterModel, KMeansConfig};
pub use predict::{
    best_predictor, fit_predictor, fit_score_model, predict_score, rate_all, LinearModel, Target,
};
pub use recommend::{
    preference_point, preference_vector, recommend, Recommendation, RecommendOptions,
};
pub use viz::draw_map;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
