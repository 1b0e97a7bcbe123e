//! Recovery of continuous gradients from the piecewise gradients of a finite element function.
use crate::allocators::DimAllocator;
use crate::error::FemError;
use crate::space::FiniteElementSpace;
use crate::util::real;
use crate::{Real, SmallDim};
use nalgebra::{DVector, DefaultAllocator, OVector};
use serde::{Deserialize, Serialize};

/// How the gradients of the cells sharing a node are averaged.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecoveryWeighting {
    /// Every cell contributes with weight one.
    #[default]
    Simple,
    /// Cells are weighted by their measure.
    Area,
    /// Cells are weighted by the distance from their barycenter to the node.
    Distance,
    /// Cells are weighted by the inverse of their measure.
    AreaHarmonic,
    /// Cells are weighted by the inverse distance from their barycenter to the node.
    DistanceHarmonic,
}

impl<T, D> FiniteElementSpace<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Recovers a continuous gradient of a scalar finite element function by averaging the
    /// gradients of all cells at every node.
    ///
    /// The result has `D` entries per node, numbered node-major like a space with `D`
    /// components on the same nodes (see [`with_components`](Self::with_components)). Nodes
    /// whose weights sum to zero fall back to the simple average.
    pub fn recover_gradient(
        &self,
        coefficients: &DVector<T>,
        weighting: RecoveryWeighting,
    ) -> Result<DVector<T>, FemError> {
        self.check_scalar("components of space for gradient recovery")?;
        if coefficients.len() != self.dof_count() {
            return Err(FemError::DimensionMismatch {
                context: "coefficient vector",
                expected: self.dof_count(),
                actual: coefficients.len(),
            });
        }
        let d = D::dim();
        let mut weighted = DVector::zeros(self.node_count() * d);
        let mut plain = DVector::zeros(self.node_count() * d);
        let mut weight_sums = vec![T::zero(); self.node_count()];
        let mut counts = vec![0usize; self.node_count()];

        for cell in 0..self.num_cells() {
            let basis = self.basis_for_cell(cell);
            let nodes = self.cell_nodes(cell);
            let measure = match weighting {
                RecoveryWeighting::Area | RecoveryWeighting::AreaHarmonic => self.mesh().cell_measure(cell)?,
                _ => T::one(),
            };
            let barycenter = self.mesh().cell_barycenter(cell);
            for (local, &node) in nodes.iter().enumerate() {
                let gradients = self.physical_basis_gradients(cell, basis.node(local))?;
                let mut gradient = OVector::<T, D>::zeros();
                for (column, &global) in gradients.column_iter().zip(nodes) {
                    gradient += column * coefficients[global];
                }
                let distance = || (&self.node_points()[node] - &barycenter).norm();
                let weight = match weighting {
                    RecoveryWeighting::Simple => T::one(),
                    RecoveryWeighting::Area => measure,
                    RecoveryWeighting::Distance => distance(),
                    RecoveryWeighting::AreaHarmonic => T::one() / measure,
                    RecoveryWeighting::DistanceHarmonic => T::one() / distance().max(real(f64::EPSILON)),
                };
                let mut weighted_rows = weighted.rows_mut(node * d, d);
                weighted_rows += &gradient * weight;
                let mut plain_rows = plain.rows_mut(node * d, d);
                plain_rows += &gradient;
                weight_sums[node] += weight;
                counts[node] += 1;
            }
        }

        for node in 0..self.node_count() {
            let (source, divisor) = if weight_sums[node] > T::zero() {
                (&weighted, weight_sums[node])
            } else {
                (&plain, real(counts[node].max(1) as f64))
            };
            let average = source.rows(node * d, d) / divisor;
            plain.rows_mut(node * d, d).copy_from(&average);
        }
        Ok(plain)
    }
}
