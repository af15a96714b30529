pub mod capability;
pub mod metrics;

pub use capability::*;
pub use metrics::*;
