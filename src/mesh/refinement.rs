//! Uniform mesh refinement.
//!
//! Every cell is split into `2^d` children. The vertices of the refined mesh are the nodes of a
//! continuous degree 2 Lagrange space on the original mesh (the old vertices plus edge
//! midpoints, quadrilateral face centers and hexahedron centers), numbered exactly like the DOFs
//! of such a space. Children are read from static tables of degree 2 multi-indices, so the
//! result is deterministic and conforming.
use crate::allocators::DimAllocator;
use crate::connectivity::{CellConnectivity, ReferenceCell};
use crate::element::LagrangeBasis;
use crate::error::FemError;
use crate::mesh::Mesh;
use crate::quadrature::shape_index;
use crate::space::numbering::{compute_node_points, number_nodes, BasisTable};
use crate::space::Continuity;
use crate::{Real, SmallDim};
use log::debug;
use nalgebra::DefaultAllocator;
use smallvec::SmallVec;
use std::sync::Arc;

/// Degree 2 barycentric multi-index of the midpoint between local vertices `i` and `j`
/// (or of vertex `i` if `i == j`).
fn simplex_node(num_vertices: usize, i: usize, j: usize) -> SmallVec<[usize; 4]> {
    let mut alpha: SmallVec<[usize; 4]> = SmallVec::from_elem(0, num_vertices);
    alpha[i] += 1;
    alpha[j] += 1;
    alpha
}

const INTERVAL_CHILDREN: [[(usize, usize); 2]; 2] = [[(0, 0), (0, 1)], [(0, 1), (1, 1)]];

const TRIANGLE_CHILDREN: [[(usize, usize); 3]; 4] = [
    [(0, 0), (0, 1), (0, 2)],
    [(0, 1), (1, 1), (1, 2)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 1), (1, 2), (0, 2)],
];

// Four corner tetrahedra, then the inner octahedron split along the diagonal between the
// midpoints of edges (0, 2) and (1, 3)
const TETRAHEDRON_CHILDREN: [[(usize, usize); 4]; 8] = [
    [(0, 0), (0, 1), (0, 2), (0, 3)],
    [(0, 1), (1, 1), (1, 2), (1, 3)],
    [(0, 2), (1, 2), (2, 2), (2, 3)],
    [(0, 3), (1, 3), (2, 3), (3, 3)],
    [(0, 2), (1, 3), (0, 1), (1, 2)],
    [(0, 2), (1, 3), (1, 2), (2, 3)],
    [(0, 2), (1, 3), (2, 3), (0, 3)],
    [(0, 2), (1, 3), (0, 3), (0, 1)],
];

fn find_node<T: Real>(basis: &LagrangeBasis<T>, multi_index: &[usize]) -> Result<usize, FemError> {
    basis.find_multi_index(multi_index).ok_or_else(|| {
        FemError::topology(format!(
            "degree {} {:?} basis has no node with multi-index {:?}",
            basis.degree(),
            basis.shape(),
            multi_index
        ))
    })
}

fn simplex_children<T: Real, const N: usize>(
    basis: &LagrangeBasis<T>,
    table: &[[(usize, usize); N]],
) -> Result<Vec<SmallVec<[usize; 8]>>, FemError> {
    let n = basis.shape().num_vertices();
    table
        .iter()
        .map(|child| {
            child
                .iter()
                .map(|&(i, j)| find_node(basis, &simplex_node(n, i, j)))
                .collect()
        })
        .collect()
}

/// Local degree 2 basis indices of the vertices of each child of the given shape.
fn child_tables<T: Real>(basis: &LagrangeBasis<T>) -> Result<Vec<SmallVec<[usize; 8]>>, FemError> {
    let shape = basis.shape();
    match shape {
        ReferenceCell::Interval => simplex_children(basis, &INTERVAL_CHILDREN),
        ReferenceCell::Triangle => simplex_children(basis, &TRIANGLE_CHILDREN),
        ReferenceCell::Tetrahedron => simplex_children(basis, &TETRAHEDRON_CHILDREN),
        ReferenceCell::Quadrilateral | ReferenceCell::Hexahedron => {
            // Child with octant bits `o` has the vertex with corner bits `b` at grid index o + b
            let d = shape.reference_dim();
            (0..(1usize << d))
                .map(|octant| {
                    (0..shape.num_vertices())
                        .map(|v| {
                            let grid_index: SmallVec<[usize; 4]> = shape
                                .reference_vertex(v)
                                .iter()
                                .enumerate()
                                .map(|(a, &c)| ((octant >> a) & 1) + usize::from(c > 0.0))
                                .collect();
                            find_node(basis, &grid_index)
                        })
                        .collect()
                })
                .collect()
        }
    }
}

impl<T, D> Mesh<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Splits every cell into `2^d` geometrically similar children (for affine cells).
    ///
    /// The children of cell `i` are cells `i * 2^d .. (i + 1) * 2^d` of the refined mesh. The
    /// total measure of the mesh is preserved.
    pub fn refine_uniformly(&self) -> Result<Self, FemError> {
        let mut bases: BasisTable<T> = Default::default();
        let mut children: [Vec<SmallVec<[usize; 8]>>; 5] = Default::default();
        for shape in self.shapes() {
            let basis = LagrangeBasis::try_new(shape, 2)?;
            children[shape_index(shape)] = child_tables(&basis)?;
            bases[shape_index(shape)] = Some(Arc::new(basis));
        }

        let (cell_nodes, node_count) = number_nodes(self.cells(), &bases, Continuity::Continuous)?;
        let vertices = compute_node_points(self, &bases, &cell_nodes, node_count);

        let mut cells = Vec::with_capacity(self.num_cells() << self.topological_dim());
        for (cell, global) in self.cells().iter().zip(cell_nodes.iter()) {
            for child in &children[shape_index(cell.shape())] {
                cells.push(CellConnectivity::new(cell.shape(), child.iter().map(|&local| global[local])));
            }
        }

        debug!(
            "Refined mesh with {} cells into mesh with {} cells and {} vertices",
            self.num_cells(),
            cells.len(),
            vertices.len()
        );
        Ok(Self::from_parts_unchecked(vertices, cells, self.topological_dim())
            .with_geometry_settings(*self.geometry_settings()))
    }
}
