pub mod config;
pub mod geometry;
pub mod observe;
pub mod optimizer;
pub mod stats;
