//! Command-line interface definitions and argument parsing

use crate::data::Feature;
use crate::model::KMeansConfig;
use crate::predict::Target;
use crate::recommend::RecommendOptions;
use clap::Parser;
use std::path::PathBuf;

/// Restaurant recommendations from k-means clusters and predicted scores
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the restaurants JSON file
    #[arg(short, long, default_value = "restaurants.json")]
    pub restaurants: PathBuf,

    /// User file (.json or flat .dat preference file)
    #[arg(short, long, required_unless_present = "list")]
    pub user: Option<PathBuf>,

    /// Number of clusters, clamped to the number of distinct restaurants
    #[arg(short = 'k', long, default_value = "4")]
    pub clusters: usize,

    /// Only consider restaurants in this category
    #[arg(short, long)]
    pub query: Option<String>,

    /// Print the predicted score of every restaurant
    #[arg(short, long)]
    pub predict: bool,

    /// Print restaurant names and exit
    #[arg(short, long)]
    pub list: bool,

    /// Features restaurants are clustered on
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [Feature::Latitude, Feature::Longitude])]
    pub features: Vec<Feature>,

    /// What the regression predicts
    #[arg(long, value_enum, default_value_t = Target::Inspection)]
    pub target: Target,

    /// Number of nearest clusters to recommend from
    #[arg(long, default_value = "1")]
    pub nearest: usize,

    /// Maximum recommendations to print
    #[arg(short = 'n', long, default_value = "10")]
    pub top: usize,

    /// Keep restaurants the user already reviewed
    #[arg(long)]
    pub include_reviewed: bool,

    /// Print recommendations as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "100")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Seed for reproducible clustering
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write a cluster map PNG to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn kmeans_config(&self) -> KMeansConfig {
        KMeansConfig {
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            seed: self.seed,
        }
    }

    pub fn recommend_options(&self) -> RecommendOptions {
        RecommendOptions {
            nearest: self.nearest,
            limit: Some(self.top),
            exclude_reviewed: !self.include_reviewed,
        }
    }

    /// Validate values clap cannot check on its own
    pub fn validate(&self) -> crate::Result<()> {
        if self.clusters == 0 {
            anyhow::bail!("--clusters must be at least 1");
        }
        if self.nearest == 0 {
            anyhow::bail!("--nearest must be at least 1");
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            anyhow::bail!("--tolerance must be a positive number");
        }
        if self.features.is_empty() {
            anyhow::bail!("--features needs at least one feature");
        }
        Ok(())
    }
}
