pub mod config;
pub mod dense;
pub mod error;
pub mod output;
pub mod scalar;
pub mod solver;
pub mod sparse;
pub mod stats;
pub mod stop;
