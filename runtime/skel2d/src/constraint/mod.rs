//! Constraint solvers applied after the base hierarchy pass
//!
//! Three constraint kinds post-process bone world transforms: inverse
//! kinematics, transform copies, and path following. Instances are invoked
//! strictly in the global order precomputed by the skeleton's update cache;
//! each solver reads and writes bone world transforms, then re-derives the
//! applied pose so later constraints see consistent values.

pub mod ik;
pub mod path;
pub mod transform;

pub use ik::{IkConstraint, IkConstraintData};
pub use path::{PathConstraint, PathConstraintData, PositionMode, RotateMode, SpacingMode};
pub use transform::{TransformConstraint, TransformConstraintData};
