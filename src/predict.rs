//! Least-squares score prediction from a single restaurant feature

use crate::data::{Feature, Restaurant, User};
use crate::error::RecommendError;
use clap::ValueEnum;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// What the regression learns to predict
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// Health inspection score, fitted on every labelled restaurant
    Inspection,
    /// The user's own review score, fitted on restaurants they reviewed
    Rating,
}

impl Target {
    pub fn bounds(self) -> ScoreBounds {
        match self {
            Target::Inspection => ScoreBounds { min: 0.0, max: 100.0 },
            Target::Rating => ScoreBounds { min: 1.0, max: 5.0 },
        }
    }
}

/// Closed interval predictions are clamped into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBounds {
    pub min: f64,
    pub max: f64,
}

impl ScoreBounds {
    pub fn clamp(&self, score: f64) -> f64 {
        if score.is_nan() {
            return self.min;
        }
        score.clamp(self.min, self.max)
    }
}

/// A fitted `score = slope * feature + intercept` line
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub feature: Feature,
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination on the training samples
    pub r_squared: f64,
    pub bounds: ScoreBounds,
}

impl LinearModel {
    /// Raw line value for a feature value, without clamping
    pub fn evaluate(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Estimate a restaurant's score, clamped to the model bounds
pub fn predict_score(restaurant: &Restaurant, model: &LinearModel) -> f64 {
    model
        .bounds
        .clamp(model.evaluate(model.feature.extract(restaurant)))
}

/// Fit ordinary least squares of score on one feature
///
/// # Arguments
/// * `samples` - `(restaurant, observed score)` pairs
/// * `feature` - Feature used as the single regressor
/// * `bounds` - Interval predictions are clamped into
///
/// # Returns
/// * Fitted model; fails with fewer than two samples or a constant feature
pub fn fit_predictor(
    samples: &[(&Restaurant, f64)],
    feature: Feature,
    bounds: ScoreBounds,
) -> Result<LinearModel, RecommendError> {
    if samples.len() < 2 {
        return Err(RecommendError::InsufficientSamples(format!(
            "{} sample(s) for {feature}, need at least 2",
            samples.len()
        )));
    }

    let xs: Vec<f64> = samples.iter().map(|(r, _)| feature.extract(r)).collect();
    let ys: Vec<f64> = samples.iter().map(|(_, y)| *y).collect();
    let n = samples.len() as f64;

    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let s_xx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let s_yy: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    let s_xy: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();

    if s_xx <= f64::EPSILON {
        return Err(RecommendError::InsufficientSamples(format!(
            "{feature} is constant across samples"
        )));
    }

    let slope = s_xy / s_xx;
    let intercept = mean_y - slope * mean_x;
    // constant scores are fitted exactly by a flat line but explain nothing
    let r_squared = if s_yy <= f64::EPSILON {
        0.0
    } else {
        s_xy.powi(2) / (s_xx * s_yy)
    };

    Ok(LinearModel {
        feature,
        slope,
        intercept,
        r_squared,
        bounds,
    })
}

/// Fit one model per feature and keep the one with the highest R²
///
/// Features that cannot be fitted are skipped. Ties keep the earlier feature.
pub fn best_predictor(
    samples: &[(&Restaurant, f64)],
    features: &[Feature],
    bounds: ScoreBounds,
) -> Result<LinearModel, RecommendError> {
    let mut best: Option<LinearModel> = None;
    for &feature in features {
        match fit_predictor(samples, feature, bounds) {
            Ok(model) => {
                debug!(%feature, r_squared = model.r_squared, "fitted predictor");
                if best.as_ref().map_or(true, |b| model.r_squared > b.r_squared) {
                    best = Some(model);
                }
            }
            Err(err) => debug!(%feature, %err, "skipping feature"),
        }
    }
    best.ok_or_else(|| {
        RecommendError::InsufficientSamples("no feature could be fitted".to_string())
    })
}

/// Training pairs for `target`
pub fn training_samples<'a>(
    target: Target,
    user: &User,
    restaurants: &'a [Restaurant],
) -> Vec<(&'a Restaurant, f64)> {
    match target {
        Target::Inspection => restaurants
            .iter()
            .filter_map(|r| r.inspection_score.map(|s| (r, s)))
            .collect(),
        Target::Rating => restaurants
            .iter()
            .filter_map(|r| user.score_for(&r.id).map(|s| (r, s)))
            .collect(),
    }
}

/// Fit the best single-feature predictor for `target`
///
/// Training scores outside the target's bounds are rejected.
pub fn fit_score_model(
    target: Target,
    user: &User,
    restaurants: &[Restaurant],
    features: &[Feature],
) -> Result<LinearModel, RecommendError> {
    let bounds = target.bounds();
    let samples = training_samples(target, user, restaurants);
    if let Some((r, score)) = samples
        .iter()
        .find(|(_, score)| !(bounds.min..=bounds.max).contains(score))
    {
        return Err(RecommendError::InvalidField {
            id: r.id.clone(),
            field: "training score",
            reason: format!("{score} is outside {}..={}", bounds.min, bounds.max),
        });
    }
    if samples.len() < 2 {
        warn!(?target, samples = samples.len(), "too few labelled restaurants");
    }
    best_predictor(&samples, features, bounds)
}

/// Score of every restaurant, keyed by id
///
/// When predicting the user's own ratings, restaurants they already reviewed
/// keep the score they gave, clamped to the model bounds.
pub fn rate_all(
    user: &User,
    restaurants: &[Restaurant],
    model: &LinearModel,
    target: Target,
) -> BTreeMap<String, f64> {
    restaurants
        .iter()
        .map(|r| {
            let known = match target {
                Target::Rating => user.score_for(&r.id),
                Target::Inspection => None,
            };
            let score = match known {
                Some(score) => model.bounds.clamp(score),
                None => predict_score(r, model),
            };
            (r.id.clone(), score)
        })
        .collect()
}
