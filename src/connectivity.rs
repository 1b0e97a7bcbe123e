//! Reference cells and cell connectivity.
//!
//! Every cell in a mesh is described by a [`CellConnectivity`]: a [`ReferenceCell`] shape
//! together with the global indices of its vertices, ordered according to the vertex numbering
//! of the reference cell. The reference cells and their sub-entity tables are static data
//! shared by all cells.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// The canonical shapes supported by meshes, quadrature and bases.
///
/// Simplices are defined on the unit simplex with vertex 0 at the origin, while quadrilaterals
/// and hexahedra are defined on `[-1, 1]^d`.
///
/// The vertex numbering of the two-dimensional cells is
///
/// ```text
/// Triangle            Quadrilateral
///
/// 2                   3 ______ 2
/// | \                 |        |
/// |   \               |        |
/// |     \             |        |
/// 0 ---- 1            0 ______ 1
/// ```
///
/// The hexahedron numbers its bottom face (`z = -1`) like the quadrilateral and its top face
/// (`z = 1`) as `4, 5, 6, 7` directly above `0, 1, 2, 3`. The tetrahedron has vertices
/// `(0, 0, 0)`, `(1, 0, 0)`, `(0, 1, 0)`, `(0, 0, 1)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceCell {
    Interval,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
}

const INTERVAL_VERTICES: [[f64; 3]; 2] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
const TRIANGLE_VERTICES: [[f64; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
const QUADRILATERAL_VERTICES: [[f64; 3]; 4] = [
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 0.0],
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
];
const TETRAHEDRON_VERTICES: [[f64; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
];
const HEXAHEDRON_VERTICES: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

const INTERVAL_EDGES: [[usize; 2]; 1] = [[0, 1]];
const TRIANGLE_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];
const QUADRILATERAL_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];
const TETRAHEDRON_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
const HEXAHEDRON_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

const INTERVAL_FACETS: [&[usize]; 2] = [&[0], &[1]];
const TRIANGLE_FACETS: [&[usize]; 3] = [&[0, 1], &[1, 2], &[2, 0]];
const QUADRILATERAL_FACETS: [&[usize]; 4] = [&[0, 1], &[1, 2], &[2, 3], &[3, 0]];
// Facets are oriented with outward normals under the right-hand rule
const TETRAHEDRON_FACETS: [&[usize]; 4] = [&[0, 2, 1], &[0, 1, 3], &[1, 2, 3], &[0, 3, 2]];
const HEXAHEDRON_FACETS: [&[usize]; 6] = [
    &[0, 3, 2, 1],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[0, 4, 7, 3],
    &[4, 5, 6, 7],
];

impl ReferenceCell {
    pub const ALL: [ReferenceCell; 5] = [
        Self::Interval,
        Self::Triangle,
        Self::Quadrilateral,
        Self::Tetrahedron,
        Self::Hexahedron,
    ];

    /// The dimension of the reference domain.
    pub fn reference_dim(&self) -> usize {
        match self {
            Self::Interval => 1,
            Self::Triangle | Self::Quadrilateral => 2,
            Self::Tetrahedron | Self::Hexahedron => 3,
        }
    }

    pub fn is_simplex(&self) -> bool {
        matches!(self, Self::Interval | Self::Triangle | Self::Tetrahedron)
    }

    pub fn num_vertices(&self) -> usize {
        self.vertex_table().len()
    }

    fn vertex_table(&self) -> &'static [[f64; 3]] {
        match self {
            Self::Interval => &INTERVAL_VERTICES,
            Self::Triangle => &TRIANGLE_VERTICES,
            Self::Quadrilateral => &QUADRILATERAL_VERTICES,
            Self::Tetrahedron => &TETRAHEDRON_VERTICES,
            Self::Hexahedron => &HEXAHEDRON_VERTICES,
        }
    }

    /// Reference coordinates of the given local vertex.
    ///
    /// The returned slice has length [`reference_dim`](Self::reference_dim).
    pub fn reference_vertex(&self, local_index: usize) -> &'static [f64] {
        &self.vertex_table()[local_index][..self.reference_dim()]
    }

    /// Reference coordinates of the barycenter of the reference cell.
    pub fn reference_barycenter(&self) -> SmallVec<[f64; 3]> {
        let d = self.reference_dim();
        let n = self.num_vertices() as f64;
        (0..d)
            .map(|k| self.vertex_table().iter().map(|v| v[k]).sum::<f64>() / n)
            .collect()
    }

    /// Volume (length, area) of the reference cell.
    pub fn reference_volume(&self) -> f64 {
        match self {
            Self::Interval => 1.0,
            Self::Triangle => 0.5,
            Self::Quadrilateral => 4.0,
            Self::Tetrahedron => 1.0 / 6.0,
            Self::Hexahedron => 8.0,
        }
    }

    /// Local edges as pairs of local vertex indices.
    pub fn edges(&self) -> &'static [[usize; 2]] {
        match self {
            Self::Interval => &INTERVAL_EDGES,
            Self::Triangle => &TRIANGLE_EDGES,
            Self::Quadrilateral => &QUADRILATERAL_EDGES,
            Self::Tetrahedron => &TETRAHEDRON_EDGES,
            Self::Hexahedron => &HEXAHEDRON_EDGES,
        }
    }

    /// Local facets (entities of codimension one) as lists of local vertex indices.
    pub fn facets(&self) -> &'static [&'static [usize]] {
        match self {
            Self::Interval => &INTERVAL_FACETS,
            Self::Triangle => &TRIANGLE_FACETS,
            Self::Quadrilateral => &QUADRILATERAL_FACETS,
            Self::Tetrahedron => &TETRAHEDRON_FACETS,
            Self::Hexahedron => &HEXAHEDRON_FACETS,
        }
    }

    pub fn num_facets(&self) -> usize {
        self.facets().len()
    }

    /// The shape of the given local facet, or `None` if the facet is a single vertex.
    pub fn facet_shape(&self, local_facet: usize) -> Option<ReferenceCell> {
        match self {
            Self::Interval => None,
            Self::Triangle | Self::Quadrilateral => Some(Self::Interval),
            Self::Tetrahedron => Some(Self::Triangle),
            Self::Hexahedron => {
                debug_assert!(local_facet < 6);
                Some(Self::Quadrilateral)
            }
        }
    }

    /// Two-dimensional sub-entities of three-dimensional cells, in facet order.
    ///
    /// Empty for cells of dimension less than three, whose two-dimensional entity (if any) is
    /// the cell itself.
    pub fn faces(&self) -> &'static [&'static [usize]] {
        match self {
            Self::Tetrahedron | Self::Hexahedron => self.facets(),
            _ => &[],
        }
    }

    /// The lowest-dimensional local entity containing exactly the given local vertices.
    ///
    /// Returns `None` if the vertices do not form a sub-entity of the cell.
    pub fn entity_spanned_by(&self, local_vertices: &[usize]) -> Option<LocalEntity> {
        let mut sorted: SmallVec<[usize; 8]> = local_vertices.iter().copied().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let same_set = |entity_vertices: &[usize]| {
            let mut entity_sorted: SmallVec<[usize; 8]> = entity_vertices.iter().copied().collect();
            entity_sorted.sort_unstable();
            entity_sorted == sorted
        };

        match sorted.len() {
            0 => None,
            1 => Some(LocalEntity::Vertex(sorted[0])),
            n if n == self.num_vertices() => Some(LocalEntity::Interior),
            2 => self
                .edges()
                .iter()
                .position(|edge| same_set(edge))
                .map(LocalEntity::Edge),
            _ => self
                .faces()
                .iter()
                .position(|face| same_set(face))
                .map(LocalEntity::Face),
        }
    }
}

/// A sub-entity of a reference cell, identified by its local index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocalEntity {
    Vertex(usize),
    Edge(usize),
    /// A two-dimensional face of a three-dimensional cell.
    Face(usize),
    /// The interior of the cell itself.
    Interior,
}

impl LocalEntity {
    /// Sort key ordering entities by dimension first, then by local index.
    pub(crate) fn ordering_key(&self) -> (usize, usize) {
        match *self {
            Self::Vertex(i) => (0, i),
            Self::Edge(i) => (1, i),
            Self::Face(i) => (2, i),
            Self::Interior => (3, 0),
        }
    }
}

/// Connectivity of a single cell: its shape and the global indices of its vertices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellConnectivity {
    shape: ReferenceCell,
    vertices: SmallVec<[usize; 8]>,
}

impl CellConnectivity {
    /// Creates a new cell connectivity.
    ///
    /// The vertex count is not validated here, see
    /// [`Mesh::try_from_vertices_and_connectivity`](crate::mesh::Mesh::try_from_vertices_and_connectivity).
    pub fn new(shape: ReferenceCell, vertices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            shape,
            vertices: vertices.into_iter().collect(),
        }
    }

    pub fn interval(vertices: [usize; 2]) -> Self {
        Self::new(ReferenceCell::Interval, vertices)
    }

    pub fn triangle(vertices: [usize; 3]) -> Self {
        Self::new(ReferenceCell::Triangle, vertices)
    }

    pub fn quadrilateral(vertices: [usize; 4]) -> Self {
        Self::new(ReferenceCell::Quadrilateral, vertices)
    }

    pub fn tetrahedron(vertices: [usize; 4]) -> Self {
        Self::new(ReferenceCell::Tetrahedron, vertices)
    }

    pub fn hexahedron(vertices: [usize; 8]) -> Self {
        Self::new(ReferenceCell::Hexahedron, vertices)
    }

    pub fn shape(&self) -> ReferenceCell {
        self.shape
    }

    pub fn vertex_indices(&self) -> &[usize] {
        &self.vertices
    }

    pub(crate) fn vertex_indices_mut(&mut self) -> &mut [usize] {
        &mut self.vertices
    }

    /// Global vertex indices of the given local edge.
    pub fn edge_vertices(&self, local_edge: usize) -> [usize; 2] {
        let [a, b] = self.shape.edges()[local_edge];
        [self.vertices[a], self.vertices[b]]
    }

    /// Global vertex indices of the given local facet, in reference facet order.
    pub fn facet_vertices(&self, local_facet: usize) -> SmallVec<[usize; 4]> {
        self.shape.facets()[local_facet]
            .iter()
            .map(|&local| self.vertices[local])
            .collect()
    }

    /// Connectivity of the given local facet as a cell of lower dimension.
    ///
    /// Returns `None` for the vertex facets of intervals.
    pub fn facet_connectivity(&self, local_facet: usize) -> Option<CellConnectivity> {
        self.shape
            .facet_shape(local_facet)
            .map(|shape| CellConnectivity::new(shape, self.facet_vertices(local_facet)))
    }
}
