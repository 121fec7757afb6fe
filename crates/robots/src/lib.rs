pub mod cache;
mod matcher;
pub mod parse;

pub use cache::{RobotsCache, RobotsVerdict};
pub use parse::RobotsRules;
