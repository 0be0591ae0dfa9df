//! dinecluster: restaurant recommendation CLI
//!
//! Loads the dataset and user, fits the score predictor and clustering,
//! prints recommendations and optionally draws the cluster map.

use anyhow::{Context, Result};
use clap::Parser;
use dinecluster::{
    draw_map, fit_kmeans, fit_score_model, load_restaurants, load_user, preference_point,
    rate_all, recommend, search, validate_user, Args, Feature, FeatureMatrix, Restaurant,
};
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    args.validate()?;

    let all_restaurants = load_restaurants(&args.restaurants)?;

    if args.list {
        print_names(&all_restaurants);
        return Ok(());
    }

    run_recommendation(&args, &all_restaurants)
}

/// Log to stderr; `RUST_LOG` overrides the level chosen by `--verbose`
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,dinecluster={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_names(restaurants: &[Restaurant]) {
    let mut names: Vec<&str> = restaurants.iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    println!("Restaurant names:");
    for name in names {
        println!("{name:?}");
    }
}

/// Predict, cluster and recommend for one user
fn run_recommendation(args: &Args, all_restaurants: &[Restaurant]) -> Result<()> {
    let start_time = Instant::now();

    let restaurants = match &args.query {
        Some(query) => {
            let found = search(query, all_restaurants);
            if found.is_empty() {
                anyhow::bail!("no restaurants in category {query:?}");
            }
            info!(query = %query, count = found.len(), "filtered by category");
            found
        }
        None => all_restaurants.to_vec(),
    };

    let user_path = args.user.as_ref().context("a --user file is required")?;
    let user = load_user(user_path)?;
    validate_user(&user, all_restaurants)
        .with_context(|| format!("user {} reviews an unknown restaurant", user.id))?;

    // Step 1: score predictor, trained on the whole dataset
    let predictor = fit_score_model(args.target, &user, all_restaurants, &Feature::ALL)
        .with_context(|| format!("cannot fit a {:?} predictor", args.target))?;
    info!(
        feature = %predictor.feature,
        slope = predictor.slope,
        intercept = predictor.intercept,
        r_squared = predictor.r_squared,
        "fitted predictor"
    );
    // with --json, stdout carries only the recommendations document
    let report = !args.json;
    if report {
        println!(
            "✓ Predictor: score = {:.3} * {} + {:.3} (R² = {:.3})",
            predictor.slope, predictor.feature, predictor.intercept, predictor.r_squared
        );
    }

    if args.predict && report {
        println!("\n=== Predicted Scores ===");
        let scores = rate_all(&user, &restaurants, &predictor, args.target);
        let mut rows: Vec<(&str, f64)> = restaurants
            .iter()
            .filter_map(|r| scores.get(&r.id).map(|s| (r.name.as_str(), *s)))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        for (name, score) in rows {
            println!("{name:40} {score:6.2}");
        }
    }

    // Step 2: clustering
    let matrix = FeatureMatrix::build(&restaurants, &args.features)?;
    let k = args.clusters.min(matrix.distinct_rows());
    if k < args.clusters {
        warn!(requested = args.clusters, k, "fewer distinct restaurants than clusters");
    }
    let model_start = Instant::now();
    let clusters = fit_kmeans(&matrix, k, &args.kmeans_config())?;
    debug!(elapsed = ?model_start.elapsed(), "clustering done");

    let point = preference_point(&user, all_restaurants, &matrix)?;
    let home = clusters.predict(&point)?;
    debug!(cluster = home, "preference cluster");
    if report {
        println!("\n=== Cluster Statistics ===");
        let total = restaurants.len();
        for (i, &size) in clusters.cluster_sizes().iter().enumerate() {
            let percentage = (size as f64 / total as f64) * 100.0;
            println!("Cluster {i}: {size} restaurants ({percentage:.1}%)");
        }
        match clusters.silhouette_sample(&matrix.scaled, 100) {
            Ok(silhouette) => println!("Silhouette score (sample): {silhouette:.3}"),
            Err(err) => warn!(%err, "silhouette score unavailable"),
        }
        println!("Within-cluster sum of squares: {:.2}", clusters.inertia);
        println!("Preferences fall in cluster {home}");
    }

    // Step 3: recommendations
    let recommendations = recommend(
        &user,
        all_restaurants,
        &restaurants,
        &matrix,
        &clusters,
        &predictor,
        &args.recommend_options(),
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&recommendations)?);
    } else {
        println!("\n=== Recommendations for {} ===", user.display_name());
        if recommendations.is_empty() {
            println!("(nothing new in the nearest cluster)");
        }
        for (rank, rec) in recommendations.iter().enumerate() {
            println!(
                "{:>2}. {:40} {:6.2}  (cluster {})",
                rank + 1,
                rec.name,
                rec.predicted_score,
                rec.cluster
            );
        }
    }

    // Step 4: optional map
    if let Some(output) = &args.output {
        draw_map(&restaurants, &clusters, output)?;
        info!(path = %output.display(), "map saved");
    }

    info!(elapsed = ?start_time.elapsed(), "done");
    Ok(())
}
