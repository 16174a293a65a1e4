pub mod aligners;
pub mod alignment_io;
pub mod error;
pub mod json;
pub mod muscle;
pub mod render;
pub mod runner;
pub mod trees;
pub mod utils;
