//! Reference elements, Lagrange bases and the reference-to-physical map.
use crate::Real;
use nalgebra::{DMatrix, DVector};

mod geometry;
mod lagrange;

pub use geometry::*;
pub use lagrange::*;

/// A set of scalar basis functions defined on a reference cell.
///
/// Reference coordinates are passed as slices of length
/// [`reference_dim`](Self::reference_dim).
pub trait ReferenceFiniteElement<T: Real> {
    fn reference_dim(&self) -> usize;

    /// Returns the number of nodes (basis functions) in the element.
    fn num_nodes(&self) -> usize;

    /// Evaluates each basis function at the given reference coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `basis_values` does not have length [`num_nodes`](Self::num_nodes).
    fn populate_basis(&self, basis_values: &mut [T], reference_coords: &[T]);

    /// Populates a `reference_dim x num_nodes` matrix whose columns are the gradients of each
    /// basis function with respect to the reference coordinates.
    ///
    /// # Panics
    ///
    /// Panics if the matrix does not have the expected shape.
    fn populate_basis_gradients(&self, basis_gradients: &mut DMatrix<T>, reference_coords: &[T]);

    fn evaluate_basis(&self, reference_coords: &[T]) -> DVector<T> {
        let mut values = DVector::zeros(self.num_nodes());
        self.populate_basis(values.as_mut_slice(), reference_coords);
        values
    }

    fn evaluate_basis_gradients(&self, reference_coords: &[T]) -> DMatrix<T> {
        let mut gradients = DMatrix::zeros(self.reference_dim(), self.num_nodes());
        self.populate_basis_gradients(&mut gradients, reference_coords);
        gradients
    }
}
