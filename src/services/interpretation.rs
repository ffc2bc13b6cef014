use crate::models::{EfCategory, EfInterpretation};

/// Clinical category of an ejection fraction percentage
///
/// 71-74% has no row of its own in the clinical table and reads as normal.
pub fn categorize(ejection_fraction: i32) -> EfCategory {
    match ejection_fraction {
        ef if ef >= 75 => EfCategory::CriticallyElevated,
        ef if ef >= 50 => EfCategory::Normal,
        ef if ef >= 41 => EfCategory::BorderlineLow,
        ef if ef >= 30 => EfCategory::ModeratelyAbnormal,
        _ => EfCategory::SeverelyAbnormal,
    }
}

pub fn interpret(ejection_fraction: i32) -> EfInterpretation {
    let category = categorize(ejection_fraction);
    EfInterpretation {
        ejection_fraction,
        category,
        note: format!("Ejection fraction of {}% is {}.", ejection_fraction, category),
    }
}
