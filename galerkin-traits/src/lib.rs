use nalgebra::RealField;

pub use nalgebra;

/// Scalar type used throughout `galerkin`.
///
/// A trait alias for real fields that can be copied cheaply, such as `f32` and `f64`.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

pub mod allocators;
