//! Cluster map rendering using Plotters

use crate::data::Restaurant;
use crate::model::{find_centroid, ClusterModel};
use anyhow::Context;
use ndarray::Array2;
use plotters::prelude::*;
use std::path::Path;
use tracing::info;

/// Color palette for different clusters
const CLUSTER_COLORS: [RGBColor; 6] = [RED, BLUE, GREEN, MAGENTA, CYAN, RGBColor(255, 140, 0)];

fn cluster_color(cluster: usize) -> RGBColor {
    CLUSTER_COLORS[cluster % CLUSTER_COLORS.len()]
}

/// Draw restaurants by location, colored by cluster, with cluster centers
///
/// Longitude runs along x and latitude along y. Centers are the mean
/// location of each cluster's members, so clusterings over any feature set
/// can be drawn.
///
/// # Arguments
/// * `restaurants` - Restaurants in the row order the model was fitted on
/// * `model` - Fitted clustering
/// * `output_path` - Path to save the PNG map
pub fn draw_map(
    restaurants: &[Restaurant],
    model: &ClusterModel,
    output_path: impl AsRef<Path>,
) -> crate::Result<()> {
    let output_path = output_path.as_ref();
    if restaurants.len() != model.labels.len() {
        anyhow::bail!(
            "model has {} labels for {} restaurants",
            model.labels.len(),
            restaurants.len()
        );
    }
    if restaurants.is_empty() {
        anyhow::bail!("nothing to draw");
    }

    let lats: Vec<f64> = restaurants.iter().map(Restaurant::latitude).collect();
    let lons: Vec<f64> = restaurants.iter().map(Restaurant::longitude).collect();
    let locations = Array2::from_shape_fn((restaurants.len(), 2), |(i, j)| {
        if j == 0 {
            lons[i]
        } else {
            lats[i]
        }
    });

    let (lon_min, lon_max) = padded_range(&lons);
    let (lat_min, lat_max) = padded_range(&lats);

    let root = BitMapBackend::new(output_path, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(lon_min..lon_max, lat_min..lat_max)?;

    chart.configure_mesh().disable_mesh().draw()?;

    for (i, restaurant) in restaurants.iter().enumerate() {
        let color = cluster_color(model.labels[i]);
        chart.draw_series(std::iter::once(Circle::new(
            (restaurant.longitude(), restaurant.latitude()),
            4,
            color.filled(),
        )))?;
    }

    let half = ((lon_max - lon_min).max(lat_max - lat_min)) * 0.01;
    for cluster in 0..model.n_clusters {
        let members = model.members(cluster);
        if members.is_empty() {
            continue;
        }
        let center = find_centroid(&locations, &members);
        let (x, y) = (center[0], center[1]);
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x - half, y - half), (x + half, y + half)],
            cluster_color(cluster).filled(),
        )))?;
    }

    root.present()
        .with_context(|| format!("failed to write map to {}", output_path.display()))?;
    info!(path = %output_path.display(), "cluster map saved");

    Ok(())
}

/// Min and max with a margin, never a zero-width range
fn padded_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let pad = ((max - min) * 0.05).max(1e-3);
    (min - pad, max + pad)
}
