//! Global numbering of degrees of freedom.
use crate::allocators::DimAllocator;
use crate::connectivity::{CellConnectivity, LocalEntity, ReferenceCell};
use crate::element::LagrangeBasis;
use crate::error::FemError;
use crate::mesh::Mesh;
use crate::quadrature::shape_index;
use crate::space::Continuity;
use crate::{Real, SmallDim};
use fenris_nested_vec::NestedVec;
use nalgebra::{DefaultAllocator, OPoint};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// One optional basis per reference cell shape.
pub(crate) type BasisTable<T> = [Option<Arc<LagrangeBasis<T>>>; 5];

pub(crate) fn basis_for_shape<T>(bases: &BasisTable<T>, shape: ReferenceCell) -> Option<&Arc<LagrangeBasis<T>>> {
    bases[shape_index(shape)].as_ref()
}

/// Global vertices of the entity a DOF is attached to, paired with the normalized vertex
/// weights of the DOF and sorted by vertex.
type DofKey = SmallVec<[(usize, usize); 8]>;

/// Numbers the nodes of scalar basis functions in order of first appearance while visiting
/// cells in order and local nodes in local order. Returns the nodes of every cell together with
/// the number of distinct nodes.
///
/// Under [`Continuity::Continuous`], nodes on vertices, edges and faces are shared between all
/// cells containing the entity. Nodes in the interior of cells, and all nodes of discontinuous
/// spaces, belong to a single cell.
pub(crate) fn number_nodes<T: Real>(
    cells: &[CellConnectivity],
    bases: &BasisTable<T>,
    continuity: Continuity,
) -> Result<(NestedVec<usize>, usize), FemError> {
    let mut lookup: FxHashMap<DofKey, usize> = FxHashMap::default();
    let mut cell_nodes = NestedVec::new();
    let mut node_count = 0;

    for (cell_index, cell) in cells.iter().enumerate() {
        let basis = basis_for_shape(bases, cell.shape()).ok_or_else(|| {
            FemError::topology(format!("no basis available for cell {} of shape {:?}", cell_index, cell.shape()))
        })?;
        let mut nodes = cell_nodes.begin_array();
        for dof in basis.local_dofs() {
            let shared = continuity == Continuity::Continuous && dof.entity() != LocalEntity::Interior;
            let index = if shared {
                let mut key: DofKey = dof
                    .vertex_weights()
                    .iter()
                    .map(|&(local_vertex, weight)| (cell.vertex_indices()[local_vertex], weight))
                    .collect();
                key.sort_unstable();
                *lookup.entry(key).or_insert_with(|| {
                    node_count += 1;
                    node_count - 1
                })
            } else {
                node_count += 1;
                node_count - 1
            };
            nodes.push_single(index);
        }
    }

    Ok((cell_nodes, node_count))
}

/// Interleaves `components` DOFs per node: local DOF `a * components + k` of a cell is
/// component `k` of its local node `a`, with global index `node * components + k`.
pub(crate) fn interleave_components(cell_nodes: &NestedVec<usize>, components: usize) -> NestedVec<usize> {
    let mut cell_dofs = NestedVec::new();
    for nodes in cell_nodes.iter() {
        let mut dofs = cell_dofs.begin_array();
        for &node in nodes {
            for k in 0..components {
                dofs.push_single(node * components + k);
            }
        }
    }
    cell_dofs
}

/// Physical location of every node.
pub(crate) fn compute_node_points<T, D>(
    mesh: &Mesh<T, D>,
    bases: &BasisTable<T>,
    cell_nodes: &NestedVec<usize>,
    node_count: usize,
) -> Vec<OPoint<T, D>>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    let mut points = vec![OPoint::<T, D>::origin(); node_count];
    let mut visited = vec![false; node_count];
    for (cell_index, nodes) in cell_nodes.iter().enumerate() {
        let cell = mesh.cell(cell_index);
        let Some(basis) = basis_for_shape(bases, cell.shape()) else {
            continue;
        };
        let geometry = mesh.cell_geometry(cell_index);
        for (local, &global) in nodes.iter().enumerate() {
            if !visited[global] {
                points[global] = geometry.map_reference_coords(basis.node(local));
                visited[global] = true;
            }
        }
    }
    points
}
