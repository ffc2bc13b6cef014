//! Demographic Feature Engineering
//!
//! Turns a demographic record, the volume tracings and the view type into the
//! fixed 27-element vector the fusion regressors were trained on:
//!
//! | index  | feature                                                   |
//! |--------|-----------------------------------------------------------|
//! | 0..4   | age, weight, height, BMI                                  |
//! | 4..11  | X mean, std, min, max, median, q1, q3                     |
//! | 11..18 | Y mean, std, min, max, median, q1, q3                     |
//! | 18..21 | x_range, y_range, aspect ratio                            |
//! | 21..26 | age bucket one-hot (Young .. Elderly)                     |
//! | 26     | view indicator (1 for a4c)                                |
//!
//! The regressors read this vector positionally, so the order is fixed.
use ndarray::{Array1, Array2, ArrayView1};
use ndarray_stats::{interpolate::Linear, Quantile1dExt, QuantileExt};
use noisy_float::types::{n64, N64};

use crate::errors::{PipelineError, PipelineResult};
use crate::models::{DemographicRecord, ViewType, VolumeTracings};

pub const DEMOGRAPHIC_FEATURE_COUNT: usize = 27;

/// Inclusive upper bounds of the finite age buckets
pub const AGE_BUCKET_BOUNDS: [u32; 4] = [30, 45, 60, 75];

pub const AGE_CATEGORIES: [&str; 5] = ["Young", "Middle-Age", "Early-Senior", "Senior", "Elderly"];

/// Descriptive statistics of one tracing axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisStatistics {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
}

impl AxisStatistics {
    /// Compute statistics over one axis
    ///
    /// The standard deviation is the population one and quartiles use linear
    /// interpolation between closest ranks.
    pub fn compute(values: &[f64], axis: char) -> PipelineResult<Self> {
        if values.is_empty() {
            return Err(PipelineError::EmptyTracing(axis));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::NonFiniteTracing(axis));
        }

        let data = ArrayView1::from(values);
        let mean = data.mean().ok_or(PipelineError::EmptyTracing(axis))?;
        let std = data.std(0.0);
        let min = *data.min().map_err(|_| PipelineError::NonFiniteTracing(axis))?;
        let max = *data.max().map_err(|_| PipelineError::NonFiniteTracing(axis))?;

        let mut ranked: Array1<N64> = data.mapv(n64);
        let mut quantile = |q: f64| -> PipelineResult<f64> {
            ranked
                .quantile_mut(n64(q), &Linear)
                .map(|value| value.raw())
                .map_err(|_| PipelineError::EmptyTracing(axis))
        };
        let q1 = quantile(0.25)?;
        let median = quantile(0.5)?;
        let q3 = quantile(0.75)?;

        Ok(Self {
            mean,
            std,
            min,
            max,
            median,
            q1,
            q3,
        })
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    fn as_array(&self) -> [f64; 7] {
        [
            self.mean,
            self.std,
            self.min,
            self.max,
            self.median,
            self.q1,
            self.q3,
        ]
    }
}

/// Shape descriptors derived from the tracing extents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TracingGeometry {
    pub x_range: f64,
    pub y_range: f64,
    pub aspect_ratio: f64,
}

impl TracingGeometry {
    pub fn from_statistics(x: &AxisStatistics, y: &AxisStatistics) -> PipelineResult<Self> {
        let x_range = x.range();
        let y_range = y.range();
        if y_range == 0.0 {
            return Err(PipelineError::DegenerateTracing);
        }

        Ok(Self {
            x_range,
            y_range,
            aspect_ratio: x_range / y_range,
        })
    }
}

/// Index of the age bucket: the first bound the age does not exceed
pub fn age_bucket(age: u32) -> usize {
    AGE_BUCKET_BOUNDS
        .iter()
        .position(|&bound| age <= bound)
        .unwrap_or(AGE_BUCKET_BOUNDS.len())
}

pub fn age_bucket_one_hot(age: u32) -> [f64; 5] {
    let mut encoding = [0.0; 5];
    encoding[age_bucket(age)] = 1.0;
    encoding
}

/// Fixed-layout demographic feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct DemographicFeatures {
    values: Vec<f64>,
}

impl DemographicFeatures {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Single-example batch `[1, 27]` in the regressor's input precision
    pub fn to_batch(&self) -> Array2<f32> {
        Array2::from_shape_fn((1, self.values.len()), |(_, i)| self.values[i] as f32)
    }
}

/// Pure feature engineering over one request's demographic data
#[derive(Debug, Clone, Copy, Default)]
pub struct DemographicFeatureEngineer;

impl DemographicFeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    pub fn engineer(
        &self,
        demographics: &DemographicRecord,
        tracings: &VolumeTracings,
        view: ViewType,
    ) -> PipelineResult<DemographicFeatures> {
        demographics
            .validate()
            .map_err(PipelineError::InvalidDemographics)?;

        let bmi = demographics.bmi();
        let x_stats = AxisStatistics::compute(&tracings.x, 'X')?;
        let y_stats = AxisStatistics::compute(&tracings.y, 'Y')?;
        let geometry = TracingGeometry::from_statistics(&x_stats, &y_stats)?;

        let mut values = Vec::with_capacity(DEMOGRAPHIC_FEATURE_COUNT);
        values.extend_from_slice(&[
            demographics.age as f64,
            demographics.weight,
            demographics.height,
            bmi,
        ]);
        values.extend_from_slice(&x_stats.as_array());
        values.extend_from_slice(&y_stats.as_array());
        values.extend_from_slice(&[geometry.x_range, geometry.y_range, geometry.aspect_ratio]);
        values.extend_from_slice(&age_bucket_one_hot(demographics.age));
        values.push(if view.is_primary() { 1.0 } else { 0.0 });

        debug_assert_eq!(values.len(), DEMOGRAPHIC_FEATURE_COUNT);
        Ok(DemographicFeatures { values })
    }
}
