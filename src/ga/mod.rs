pub mod cache;
pub mod candidate;
pub mod evaluator;
pub mod optimizer;
pub mod population;
