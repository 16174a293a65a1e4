pub mod check;
pub mod driver;
pub mod log;
pub mod params_generator;
pub mod report;

pub use driver::{DriverState, Pipeline, Services};
pub use report::{PipelineReport, PipelineWarning};
