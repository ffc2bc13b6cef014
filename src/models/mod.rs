// Request, result and clinical data structures

pub mod echo;
pub mod ef_prediction;

pub use echo::*;
pub use ef_prediction::*;
