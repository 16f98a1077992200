//! Normalization and reshaping transforms applied to a run's logs.

mod occupancy;
mod reshape;
mod timeline;

pub use occupancy::*;
pub use reshape::*;
pub use timeline::*;
