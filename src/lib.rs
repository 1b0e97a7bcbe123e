//! A finite element engine for scalar and vector-valued PDEs on unstructured meshes.
//!
//! The crate is organized bottom-up: [`mesh`] stores vertices and cells and derives their
//! topology, [`element`] provides Lagrange bases and the reference-to-physical map,
//! [`space`] numbers degrees of freedom, and [`assembly`] integrates kernels into sparse
//! linear systems with boundary conditions applied. [`projection`], [`norms`] and [`estimate`]
//! work with the resulting finite element functions.
use nalgebra::{DimMin, DimName};

pub mod assembly;
pub mod connectivity;
pub mod element;
pub mod error;
pub mod estimate;
pub mod mesh;
pub mod norms;
pub mod projection;
pub mod quadrature;
pub mod space;
pub mod util;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub use galerkin_traits::allocators;
pub use galerkin_traits::Real;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// A small, fixed-size dimension.
///
/// Used as a trait alias for various traits frequently needed by generic `galerkin` routines.
pub trait SmallDim: DimName + DimMin<Self, Output = Self> {}

impl<D> SmallDim for D where D: DimName + DimMin<Self, Output = Self> {}

/// Whether a kernel, and hence the element matrices it produces, is symmetric.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Symmetry {
    NonSymmetric,
    Symmetric,
}
