use crate::allocators::DimAllocator;
use crate::element::{physical_gradients, ReferenceFiniteElement, VertexBasis};
use crate::error::FemError;
use crate::space::FiniteElementSpace;
use crate::util::real;
use crate::{Real, SmallDim};
use nalgebra::{DMatrix, DVector, DefaultAllocator, Dyn, OMatrix, OPoint, OVector};
use std::iter::repeat;

impl<T, D> FiniteElementSpace<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Interpolates a scalar function by evaluating it at every node.
    ///
    /// For spaces with several components, every component receives the same value.
    pub fn interpolate<F>(&self, mut f: F) -> DVector<T>
    where
        F: FnMut(&OPoint<T, D>) -> T,
    {
        let m = self.components();
        DVector::from_iterator(
            self.dof_count(),
            self.node_points().iter().flat_map(|x| repeat(f(x)).take(m)),
        )
    }

    /// Interpolates a vector-valued function with one entry per component.
    pub fn interpolate_vector<F>(&self, mut f: F) -> Result<DVector<T>, FemError>
    where
        F: FnMut(&OPoint<T, D>) -> DVector<T>,
    {
        let m = self.components();
        let mut result = DVector::zeros(self.dof_count());
        for (node, x) in self.node_points().iter().enumerate() {
            let value = f(x);
            if value.len() != m {
                return Err(FemError::DimensionMismatch {
                    context: "interpolated function components",
                    expected: m,
                    actual: value.len(),
                });
            }
            result.rows_mut(node * m, m).copy_from(&value);
        }
        Ok(result)
    }

    fn check_evaluation_input(&self, coefficients: &DVector<T>, cell_index: usize, reference_coords: &[T]) -> Result<(), FemError> {
        if coefficients.len() != self.dof_count() {
            return Err(FemError::DimensionMismatch {
                context: "coefficient vector",
                expected: self.dof_count(),
                actual: coefficients.len(),
            });
        }
        self.check_cell_index(cell_index)?;
        let reference_dim = self.mesh().cell(cell_index).shape().reference_dim();
        if reference_coords.len() != reference_dim {
            return Err(FemError::DimensionMismatch {
                context: "reference coordinates",
                expected: reference_dim,
                actual: reference_coords.len(),
            });
        }
        Ok(())
    }

    /// Evaluates the finite element function with the given coefficients at a point of a cell,
    /// given in reference coordinates of the cell.
    ///
    /// Only defined for scalar spaces; see [`evaluate_vector`](Self::evaluate_vector).
    pub fn evaluate(&self, coefficients: &DVector<T>, cell_index: usize, reference_coords: &[T]) -> Result<T, FemError> {
        self.check_scalar("components of evaluated space")?;
        let values = self.evaluate_vector(coefficients, cell_index, reference_coords)?;
        Ok(values[0])
    }

    /// Evaluates every component of the finite element function at a point of a cell.
    pub fn evaluate_vector(
        &self,
        coefficients: &DVector<T>,
        cell_index: usize,
        reference_coords: &[T],
    ) -> Result<DVector<T>, FemError> {
        self.check_evaluation_input(coefficients, cell_index, reference_coords)?;
        let m = self.components();
        let values = self
            .basis_for_cell(cell_index)
            .evaluate_basis(reference_coords);
        let mut result = DVector::zeros(m);
        for (&node, &phi) in self.cell_nodes(cell_index).iter().zip(values.iter()) {
            result += coefficients.rows(node * m, m) * phi;
        }
        Ok(result)
    }

    /// Physical gradients of the basis functions of a cell, one column per local node.
    pub(crate) fn physical_basis_gradients(
        &self,
        cell_index: usize,
        reference_coords: &[T],
    ) -> Result<OMatrix<T, D, Dyn>, FemError> {
        let basis = self.basis_for_cell(cell_index);
        let geometry = self.mesh().cell_geometry(cell_index);
        let shape_gradients: DMatrix<T> = VertexBasis::new(geometry.shape()).evaluate_basis_gradients(reference_coords);
        let jacobian = crate::element::jacobian_from_shape_gradients(geometry.vertices(), &shape_gradients);
        let reference_gradients = basis.evaluate_basis_gradients(reference_coords);
        let mut gradients = OMatrix::<T, D, Dyn>::zeros(basis.num_nodes());
        physical_gradients(
            &jacobian,
            &reference_gradients,
            &mut gradients,
            real(self.mesh().geometry_settings().relative_tolerance),
        )
        .map_err(|err| err.with_cell(cell_index))?;
        Ok(gradients)
    }

    /// Evaluates the physical gradient of the finite element function with the given
    /// coefficients at a point of a cell, given in reference coordinates of the cell.
    ///
    /// For cells embedded in a higher-dimensional space this is the tangential gradient. Only
    /// defined for scalar spaces.
    pub fn evaluate_gradient(
        &self,
        coefficients: &DVector<T>,
        cell_index: usize,
        reference_coords: &[T],
    ) -> Result<OVector<T, D>, FemError> {
        self.check_scalar("components of differentiated space")?;
        self.check_evaluation_input(coefficients, cell_index, reference_coords)?;
        let gradients = self.physical_basis_gradients(cell_index, reference_coords)?;
        let mut result = OVector::<T, D>::zeros();
        for (column, &global) in gradients.column_iter().zip(self.local_to_global(cell_index)) {
            result += column * coefficients[global];
        }
        Ok(result)
    }
}
