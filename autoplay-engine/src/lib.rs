pub mod backtrack;
pub mod config;
pub mod engine;
pub mod evaluate;
pub mod futures;
pub mod helper;
pub mod nexts;
pub mod report;

pub use config::SearchParams;
pub use engine::{Engine, OutputPaths};
pub use helper::HelperPool;
