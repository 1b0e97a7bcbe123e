//! Finite element spaces and their degrees of freedom.
use crate::allocators::DimAllocator;
use crate::connectivity::{LocalEntity, ReferenceCell};
use crate::element::LagrangeBasis;
use crate::error::FemError;
use crate::mesh::Mesh;
use crate::quadrature::shape_index;
use crate::{Real, SmallDim};
use fenris_nested_vec::NestedVec;
use log::debug;
use nalgebra::{DefaultAllocator, OPoint};
use numbering::{basis_for_shape, compute_node_points, interleave_components, number_nodes, BasisTable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod interpolate;
pub(crate) mod numbering;
mod prolongation;
mod recovery;

pub use recovery::RecoveryWeighting;

/// Whether degrees of freedom on shared entities are shared between cells.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Continuity {
    /// Globally continuous functions: DOFs on shared vertices, edges and faces are shared.
    #[default]
    Continuous,
    /// Piecewise polynomials without continuity constraints: every cell owns its DOFs.
    Discontinuous,
}

/// A Lagrange finite element space over a mesh, with one or more components per node.
///
/// The space holds one basis per cell shape present in the mesh, all of the same degree, and
/// the local-to-global map of its nodes. The local node ordering of every cell is the ordering
/// of the basis of its shape.
///
/// A space with `m` components carries `m` DOFs per node, numbered node-major: component `k` of
/// global node `n` is DOF `n * m + k`, and local DOF `a * m + k` of a cell is component `k` of its
/// local node `a`. Scalar spaces have a single component, so nodes and DOFs coincide.
#[derive(Debug, Clone)]
pub struct FiniteElementSpace<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    mesh: Arc<Mesh<T, D>>,
    degree: usize,
    continuity: Continuity,
    components: usize,
    bases: BasisTable<T>,
    cell_nodes: NestedVec<usize>,
    cell_dofs: NestedVec<usize>,
    node_count: usize,
    node_points: Vec<OPoint<T, D>>,
}

impl<T, D> FiniteElementSpace<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Creates a scalar space of the given degree, constructing a basis for every shape in the mesh.
    pub fn try_new(mesh: Arc<Mesh<T, D>>, degree: usize, continuity: Continuity) -> Result<Self, FemError> {
        Self::try_new_with_components(mesh, degree, continuity, 1)
    }

    /// Creates a vector-valued space with `components` DOFs per node.
    pub fn try_new_with_components(
        mesh: Arc<Mesh<T, D>>,
        degree: usize,
        continuity: Continuity,
        components: usize,
    ) -> Result<Self, FemError> {
        let bases = mesh
            .shapes()
            .into_iter()
            .map(|shape| LagrangeBasis::try_new(shape, degree).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        // Empty meshes have no bases to take the degree from
        let mut space = Self::try_new_with_bases(mesh, bases, continuity)?.with_components(components)?;
        space.degree = degree;
        Ok(space)
    }

    /// Creates a scalar space from existing bases, which may be shared with other spaces.
    ///
    /// There must be a basis for every shape present in the mesh, and all bases must have the
    /// same degree. If several bases are given for the same shape, the last one is used.
    pub fn try_new_with_bases(
        mesh: Arc<Mesh<T, D>>,
        bases: impl IntoIterator<Item = Arc<LagrangeBasis<T>>>,
        continuity: Continuity,
    ) -> Result<Self, FemError> {
        let mut table: BasisTable<T> = Default::default();
        let mut degree = None;
        for basis in bases {
            match degree {
                None => degree = Some(basis.degree()),
                Some(expected) if expected != basis.degree() => {
                    return Err(FemError::DimensionMismatch {
                        context: "basis degree",
                        expected,
                        actual: basis.degree(),
                    });
                }
                Some(_) => {}
            }
            let index = shape_index(basis.shape());
            table[index] = Some(basis);
        }

        let (cell_nodes, node_count) = number_nodes(mesh.cells(), &table, continuity)?;
        let node_points = compute_node_points(&mesh, &table, &cell_nodes, node_count);
        let degree = degree.unwrap_or(0);
        debug!(
            "Created {:?} finite element space of degree {} with {} nodes on {} cells",
            continuity,
            degree,
            node_count,
            mesh.num_cells()
        );

        Ok(Self {
            mesh,
            degree,
            continuity,
            components: 1,
            bases: table,
            cell_dofs: cell_nodes.clone(),
            cell_nodes,
            node_count,
            node_points,
        })
    }

    /// Returns the same space with `components` DOFs per node.
    pub fn with_components(mut self, components: usize) -> Result<Self, FemError> {
        if components == 0 {
            return Err(FemError::DimensionMismatch {
                context: "number of space components",
                expected: 1,
                actual: 0,
            });
        }
        self.cell_dofs = interleave_components(&self.cell_nodes, components);
        self.components = components;
        Ok(self)
    }

    pub fn mesh(&self) -> &Arc<Mesh<T, D>> {
        &self.mesh
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn continuity(&self) -> Continuity {
        self.continuity
    }

    pub fn num_cells(&self) -> usize {
        self.mesh.num_cells()
    }

    /// Number of DOFs per node.
    pub fn components(&self) -> usize {
        self.components
    }

    /// The number of scalar nodes, shared by all components.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// The total number of degrees of freedom. Global DOF indices are `0 .. dof_count()`.
    pub fn dof_count(&self) -> usize {
        self.node_count * self.components
    }

    /// Global DOF indices of the given cell, in local DOF order.
    ///
    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn local_to_global(&self, cell_index: usize) -> &[usize] {
        self.cell_dofs
            .get(cell_index)
            .expect("Cell index must be in bounds")
    }

    /// Global node indices of the given cell, in the local node order of its basis.
    ///
    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn cell_nodes(&self, cell_index: usize) -> &[usize] {
        self.cell_nodes
            .get(cell_index)
            .expect("Cell index must be in bounds")
    }

    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn num_local_dofs(&self, cell_index: usize) -> usize {
        self.local_to_global(cell_index).len()
    }

    /// The largest number of local DOFs of any cell.
    pub fn max_local_dofs(&self) -> usize {
        self.cell_dofs.iter().map(<[usize]>::len).max().unwrap_or(0)
    }

    pub fn basis_for_shape(&self, shape: ReferenceCell) -> Option<&Arc<LagrangeBasis<T>>> {
        basis_for_shape(&self.bases, shape)
    }

    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn basis_for_cell(&self, cell_index: usize) -> &LagrangeBasis<T> {
        self.basis_for_shape(self.mesh.cell(cell_index).shape())
            .expect("Space must have a basis for every shape in the mesh")
    }

    /// Physical position of every node.
    pub fn node_points(&self) -> &[OPoint<T, D>] {
        &self.node_points
    }

    /// Physical position of the node carrying the given DOF.
    ///
    /// # Panics
    ///
    /// Panics if the DOF index is out of bounds.
    pub fn dof_point(&self, dof: usize) -> &OPoint<T, D> {
        &self.node_points[dof / self.components]
    }

    /// Sorted global indices of the DOFs on the given facet.
    ///
    /// For discontinuous spaces these are the DOFs of every cell containing the facet.
    pub fn facet_dofs(&self, facet_index: usize) -> Result<Vec<usize>, FemError> {
        if facet_index >= self.mesh.num_facets() {
            return Err(FemError::topology(format!(
                "facet index {} is out of bounds for mesh with {} facets",
                facet_index,
                self.mesh.num_facets()
            )));
        }
        let nodes = self
            .mesh
            .facet_incidences(facet_index)
            .into_iter()
            .flat_map(|(cell, local_facet)| {
                let global = self.cell_nodes(cell);
                self.basis_for_cell(cell)
                    .facet_dofs(local_facet)
                    .iter()
                    .map(move |&local| global[local])
            })
            .collect();
        Ok(self.expand_nodes(nodes))
    }

    /// Sorted global indices of the DOFs attached to the given mesh vertex.
    pub fn vertex_dofs(&self, vertex_index: usize) -> Result<Vec<usize>, FemError> {
        let cells = self
            .mesh
            .cells_adjacent_to(crate::mesh::MeshEntity::Vertex(vertex_index))?;
        let nodes = cells
            .iter()
            .flat_map(|&cell| {
                let global = self.cell_nodes(cell);
                let cell_vertices = self.mesh.cell_vertices(cell);
                self.basis_for_cell(cell)
                    .local_dofs()
                    .iter()
                    .enumerate()
                    .filter(move |(_, dof)| match dof.entity() {
                        LocalEntity::Vertex(local_vertex) => cell_vertices[local_vertex] == vertex_index,
                        _ => false,
                    })
                    .map(move |(local, _)| global[local])
            })
            .collect();
        Ok(self.expand_nodes(nodes))
    }

    /// Sorted global indices of all DOFs on boundary facets.
    pub fn boundary_dofs(&self) -> Vec<usize> {
        let mut nodes = Vec::new();
        for &facet in self.mesh.boundary_facets() {
            for (cell, local_facet) in self.mesh.facet_incidences(facet) {
                let global = self.cell_nodes(cell);
                nodes.extend(
                    self.basis_for_cell(cell)
                        .facet_dofs(local_facet)
                        .iter()
                        .map(|&local| global[local]),
                );
            }
        }
        self.expand_nodes(nodes)
    }

    /// Sorts and deduplicates node indices, then replaces every node by its DOFs.
    fn expand_nodes(&self, mut nodes: Vec<usize>) -> Vec<usize> {
        nodes.sort_unstable();
        nodes.dedup();
        let m = self.components;
        nodes
            .into_iter()
            .flat_map(|node| (node * m)..(node * m + m))
            .collect()
    }

    pub(crate) fn check_scalar(&self, context: &'static str) -> Result<(), FemError> {
        if self.components == 1 {
            Ok(())
        } else {
            Err(FemError::DimensionMismatch {
                context,
                expected: 1,
                actual: self.components,
            })
        }
    }

    pub(crate) fn check_cell_index(&self, cell_index: usize) -> Result<(), FemError> {
        if cell_index < self.num_cells() {
            Ok(())
        } else {
            Err(FemError::topology(format!(
                "cell index {} is out of bounds for mesh with {} cells",
                cell_index,
                self.num_cells()
            )))
        }
    }
}
