//! Chart aggregate: viewport geometry and coverage gaps.

pub mod gaps;
pub mod value_objects;

pub use gaps::*;
pub use value_objects::*;
