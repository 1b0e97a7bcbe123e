use crate::allocators::DimAllocator;
use crate::element::ReferenceFiniteElement;
use crate::error::FemError;
use crate::space::FiniteElementSpace;
use crate::{Real, SmallDim};
use log::debug;
use nalgebra::DefaultAllocator;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

impl<T, D> FiniteElementSpace<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// The matrix interpolating functions of the degree 1 space on the same mesh into this space.
    ///
    /// Columns are numbered like the DOFs of
    /// `FiniteElementSpace::try_new_with_components(mesh, 1, continuity, components)`, rows like
    /// the DOFs of this space. Each row holds the values of the degree 1 basis functions at the
    /// node of the row, repeated for every component.
    pub fn linear_interpolation_matrix(&self) -> Result<CsrMatrix<T>, FemError> {
        let m = self.components();
        let linear = FiniteElementSpace::try_new_with_components(self.mesh().clone(), 1, self.continuity(), m)?;
        let mut coo = CooMatrix::new(self.dof_count(), linear.dof_count());
        let mut visited = vec![false; self.node_count()];
        for cell in 0..self.num_cells() {
            let basis = self.basis_for_cell(cell);
            let linear_basis = linear.basis_for_cell(cell);
            let linear_nodes = linear.cell_nodes(cell);
            for (local, &node) in self.cell_nodes(cell).iter().enumerate() {
                if visited[node] {
                    continue;
                }
                visited[node] = true;
                let values = linear_basis.evaluate_basis(basis.node(local));
                for (&linear_node, &value) in linear_nodes.iter().zip(values.iter()) {
                    if value != T::zero() {
                        for k in 0..m {
                            coo.push(node * m + k, linear_node * m + k, value);
                        }
                    }
                }
            }
        }
        debug!(
            "Assembled {}x{} linear interpolation matrix with {} non-zeros",
            coo.nrows(),
            coo.ncols(),
            coo.nnz()
        );
        Ok(CsrMatrix::from(&coo))
    }
}
