pub mod pipeline;
pub mod validate;

pub use pipeline::AnalysisPipeline;
pub use validate::Validator;
