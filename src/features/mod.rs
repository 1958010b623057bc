pub mod health;
pub mod sampler;
