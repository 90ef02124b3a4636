pub mod aggregate;
pub mod config;
pub mod dashboard;
pub mod load;
pub mod normalize;
pub mod table;

pub use config::PipelineConfig;
pub use normalize::{NormalizeError, Normalizer};
pub use table::{RawTable, SessionTable};
