mod score;

pub use score::{health_score, HealthReport};
