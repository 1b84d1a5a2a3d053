pub mod build;
pub mod duration;
pub mod plan;
