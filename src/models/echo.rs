use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Echocardiographic imaging views with a trained regressor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    /// Apical four chamber, the primary view
    A4c,
    /// Parasternal short axis
    Psax,
}

impl ViewType {
    pub const ALL: [ViewType; 2] = [ViewType::A4c, ViewType::Psax];

    pub fn is_primary(&self) -> bool {
        matches!(self, ViewType::A4c)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::A4c => "a4c",
            ViewType::Psax => "psax",
        }
    }
}

impl std::fmt::Display for ViewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ViewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4c" => Ok(ViewType::A4c),
            "psax" => Ok(ViewType::Psax),
            other => Err(format!("unknown view type '{}', expected a4c or psax", other)),
        }
    }
}

/// Patient demographics supplied with each prediction request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemographicRecord {
    /// Age in whole years
    pub age: u32,
    /// Weight in kilograms
    pub weight: f64,
    /// Height in centimetres
    pub height: f64,
}

impl DemographicRecord {
    pub fn new(age: u32, weight: f64, height: f64) -> Self {
        Self { age, weight, height }
    }

    /// Body mass index, kg/m²
    pub fn bmi(&self) -> f64 {
        let height_m = self.height / 100.0;
        self.weight / (height_m * height_m)
    }

    /// Reject weights and heights that would make BMI meaningless
    pub fn validate(&self) -> Result<(), String> {
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(format!("weight must be a positive number, got {}", self.weight));
        }
        if !self.height.is_finite() || self.height <= 0.0 {
            return Err(format!("height must be a positive number, got {}", self.height));
        }
        Ok(())
    }
}

/// Boundary coordinates traced over the echo frames
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VolumeTracings {
    #[serde(rename = "X", alias = "x")]
    pub x: Vec<f64>,
    #[serde(rename = "Y", alias = "y")]
    pub y: Vec<f64>,
}

impl VolumeTracings {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        Self { x, y }
    }
}
