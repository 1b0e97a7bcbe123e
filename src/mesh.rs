use crate::allocators::DimAllocator;
use crate::connectivity::{CellConnectivity, ReferenceCell};
use crate::element::{ElementGeometry, GeometrySettings, Pushforward, ReferenceFiniteElement};
use crate::error::FemError;
use crate::util::real;
use crate::{Real, SmallDim};
use log::debug;
use nalgebra::{DefaultAllocator, OPoint, OVector, U1, U2, U3};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use topology::MeshTopology;

pub mod procedural;
pub mod refinement;
mod topology;

/// A mesh entity, identified by its global index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeshEntity {
    Vertex(usize),
    Edge(usize),
    /// An entity of codimension one: a vertex in meshes of intervals, an edge in meshes of
    /// two-dimensional cells and a face in meshes of three-dimensional cells.
    Facet(usize),
    Cell(usize),
}

/// Index-based data structure for conforming meshes (i.e. no hanging nodes).
///
/// A mesh consists of vertices in `D`-dimensional space and cells that refer to the vertices by
/// index. All cells have the same reference dimension `d <= D`, but shapes may otherwise be
/// mixed (e.g. triangles and quadrilaterals). Meshes with `d < D` describe embedded manifolds,
/// such as curves in the plane or surfaces in space.
///
/// Meshes are immutable once constructed, and every constructor validates the mesh. Derived
/// topology (edges, facets, adjacency) is computed on first use and then reused.
#[derive(Debug, Clone)]
pub struct Mesh<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    vertices: Vec<OPoint<T, D>>,
    cells: Vec<CellConnectivity>,
    topological_dim: usize,
    settings: GeometrySettings,
    topology: OnceLock<MeshTopology>,
}

pub type Mesh1d<T> = Mesh<T, U1>;
pub type Mesh2d<T> = Mesh<T, U2>;
pub type Mesh3d<T> = Mesh<T, U3>;

impl<T, D> PartialEq for Mesh<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn eq(&self, other: &Self) -> bool {
        self.vertices == other.vertices && self.cells == other.cells
    }
}

impl<T, D> Mesh<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Constructs a mesh from vertices and cell connectivity, validating both.
    ///
    /// Returns [`FemError::Topology`] if a cell refers to a vertex that does not exist, repeats a
    /// vertex, has the wrong number of vertices for its shape, or if the cells do not all have
    /// the same reference dimension (at most `D`). Returns [`FemError::DegenerateGeometry`] if
    /// the map from the reference cell to any cell is inverted or close to singular.
    pub fn try_from_vertices_and_connectivity(
        vertices: Vec<OPoint<T, D>>,
        cells: Vec<CellConnectivity>,
    ) -> Result<Self, FemError> {
        Self::try_from_vertices_and_connectivity_with_settings(vertices, cells, &GeometrySettings::default())
    }

    pub fn try_from_vertices_and_connectivity_with_settings(
        vertices: Vec<OPoint<T, D>>,
        cells: Vec<CellConnectivity>,
        settings: &GeometrySettings,
    ) -> Result<Self, FemError> {
        let topological_dim = validate_connectivity(vertices.len(), D::dim(), &cells)?;
        for (cell_index, cell) in cells.iter().enumerate() {
            ElementGeometry::from_connectivity(cell, &vertices)
                .check(settings)
                .map_err(|err| err.with_cell(cell_index))?;
        }
        debug!(
            "Created mesh with {} vertices and {} cells of dimension {} in {} dimensions",
            vertices.len(),
            cells.len(),
            topological_dim,
            D::dim()
        );
        Ok(Self::from_parts_unchecked(vertices, cells, topological_dim).with_geometry_settings(*settings))
    }

    /// Assembles a mesh from parts that are valid by construction.
    pub(crate) fn from_parts_unchecked(
        vertices: Vec<OPoint<T, D>>,
        cells: Vec<CellConnectivity>,
        topological_dim: usize,
    ) -> Self {
        debug_assert_eq!(
            validate_connectivity(vertices.len(), D::dim(), &cells).ok(),
            Some(topological_dim)
        );
        Self {
            vertices,
            cells,
            topological_dim,
            settings: GeometrySettings::default(),
            topology: OnceLock::new(),
        }
    }

    pub(crate) fn with_geometry_settings(mut self, settings: GeometrySettings) -> Self {
        self.settings = settings;
        self
    }

    /// The tolerances the cells of this mesh were validated with.
    ///
    /// Computations on the cells of the mesh, such as basis gradients and cell measures, use
    /// the same tolerances.
    pub fn geometry_settings(&self) -> &GeometrySettings {
        &self.settings
    }

    pub fn vertices(&self) -> &[OPoint<T, D>] {
        &self.vertices
    }

    pub fn cells(&self) -> &[CellConnectivity] {
        &self.cells
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// # Panics
    ///
    /// Panics if the vertex index is out of bounds.
    pub fn vertex(&self, vertex_index: usize) -> &OPoint<T, D> {
        &self.vertices[vertex_index]
    }

    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn cell(&self, cell_index: usize) -> &CellConnectivity {
        &self.cells[cell_index]
    }

    /// Global vertex indices of the given cell, in reference vertex order.
    ///
    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn cell_vertices(&self, cell_index: usize) -> &[usize] {
        self.cells[cell_index].vertex_indices()
    }

    /// The reference dimension shared by all cells. Zero for meshes without cells.
    pub fn topological_dim(&self) -> usize {
        self.topological_dim
    }

    /// The distinct cell shapes present in the mesh, in increasing order.
    pub fn shapes(&self) -> Vec<ReferenceCell> {
        self.cells
            .iter()
            .map(CellConnectivity::shape)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn topology(&self) -> &MeshTopology {
        self.topology.get_or_init(|| {
            let topology = MeshTopology::build(self.vertices.len(), &self.cells);
            debug!(
                "Computed mesh topology: {} edges, {} facets ({} on the boundary)",
                topology.edges.num_entities(),
                topology.facets.num_entities(),
                topology.boundary_facets.len()
            );
            topology
        })
    }

    pub fn num_edges(&self) -> usize {
        self.topology().edges.num_entities()
    }

    pub fn num_facets(&self) -> usize {
        self.topology().facets.num_entities()
    }

    /// # Panics
    ///
    /// Panics if the edge index is out of bounds.
    pub fn edge_vertices(&self, edge_index: usize) -> &[usize] {
        self.topology()
            .edges
            .entity_vertices
            .get(edge_index)
            .expect("Edge index out of bounds")
    }

    /// Vertices of the given facet, ordered as in the first cell containing it.
    ///
    /// For boundary facets this is the order of the local facet of the single incident cell, so
    /// the orientation of the facet is consistent with the outward normal.
    ///
    /// # Panics
    ///
    /// Panics if the facet index is out of bounds.
    pub fn facet_vertices(&self, facet_index: usize) -> &[usize] {
        self.topology()
            .facets
            .entity_vertices
            .get(facet_index)
            .expect("Facet index out of bounds")
    }

    /// Global facet indices of the given cell, in local facet order.
    ///
    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn cell_facets(&self, cell_index: usize) -> &[usize] {
        self.topology()
            .facets
            .cell_entities
            .get(cell_index)
            .expect("Cell index out of bounds")
    }

    /// Global edge indices of the given cell, in local edge order.
    ///
    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn cell_edges(&self, cell_index: usize) -> &[usize] {
        self.topology()
            .edges
            .cell_entities
            .get(cell_index)
            .expect("Cell index out of bounds")
    }

    /// The cells that contain the given facet (one for boundary facets, two for interior ones).
    ///
    /// # Panics
    ///
    /// Panics if the facet index is out of bounds.
    pub fn facet_cells(&self, facet_index: usize) -> &[usize] {
        self.topology()
            .facets
            .entity_cells
            .get(facet_index)
            .expect("Facet index out of bounds")
    }

    /// Pairs `(cell, local facet index)` for every cell containing the given facet.
    pub fn facet_incidences(&self, facet_index: usize) -> Vec<(usize, usize)> {
        self.facet_cells(facet_index)
            .iter()
            .filter_map(|&cell| {
                self.cell_facets(cell)
                    .iter()
                    .position(|&f| f == facet_index)
                    .map(|local| (cell, local))
            })
            .collect()
    }

    /// Returns the cells adjacent to the given entity.
    ///
    /// For vertices, edges and facets these are the cells containing the entity, in increasing
    /// order. For a cell these are the cells that share a facet with it, in local facet order.
    pub fn cells_adjacent_to(&self, entity: MeshEntity) -> Result<&[usize], FemError> {
        let topology = self.topology();
        let (row, count, name) = match entity {
            MeshEntity::Vertex(v) => (topology.vertex_cells.get(v), self.num_vertices(), "vertex"),
            MeshEntity::Edge(e) => (topology.edges.entity_cells.get(e), self.num_edges(), "edge"),
            MeshEntity::Facet(f) => (topology.facets.entity_cells.get(f), self.num_facets(), "facet"),
            MeshEntity::Cell(c) => (topology.cell_neighbors.get(c), self.num_cells(), "cell"),
        };
        row.ok_or_else(|| {
            let index = match entity {
                MeshEntity::Vertex(i) | MeshEntity::Edge(i) | MeshEntity::Facet(i) | MeshEntity::Cell(i) => i,
            };
            FemError::topology(format!(
                "{} index {} is out of bounds for mesh with {} {}s",
                name, index, count, name
            ))
        })
    }

    /// Facets contained in exactly one cell, in increasing order.
    pub fn boundary_facets(&self) -> &[usize] {
        &self.topology().boundary_facets
    }

    /// Returns a sorted list of vertices that belong to at least one boundary facet.
    pub fn boundary_vertices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .boundary_facets()
            .iter()
            .flat_map(|&f| self.facet_vertices(f).iter().copied())
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Boundary facets whose barycenter satisfies the predicate.
    pub fn boundary_facets_where<F>(&self, mut predicate: F) -> Vec<usize>
    where
        F: FnMut(&OPoint<T, D>) -> bool,
    {
        self.boundary_facets()
            .iter()
            .copied()
            .filter(|&f| predicate(&self.facet_barycenter(f)))
            .collect()
    }

    fn vertex_average(&self, vertex_indices: &[usize]) -> OPoint<T, D> {
        let n = real::<T>(vertex_indices.len() as f64);
        let sum = vertex_indices
            .iter()
            .fold(OVector::<T, D>::zeros(), |acc, &v| acc + &self.vertices[v].coords);
        OPoint::from(sum / n)
    }

    pub fn cell_barycenter(&self, cell_index: usize) -> OPoint<T, D> {
        self.vertex_average(self.cell_vertices(cell_index))
    }

    pub fn facet_barycenter(&self, facet_index: usize) -> OPoint<T, D> {
        self.vertex_average(self.facet_vertices(facet_index))
    }

    pub fn cell_geometry(&self, cell_index: usize) -> ElementGeometry<T, D> {
        ElementGeometry::from_connectivity(&self.cells[cell_index], &self.vertices)
    }

    /// Largest distance between two vertices of the cell.
    pub fn cell_diameter(&self, cell_index: usize) -> T {
        self.cell_geometry(cell_index).diameter()
    }

    /// Volume (area, length) of the cell.
    pub fn cell_measure(&self, cell_index: usize) -> Result<T, FemError> {
        self.cell_geometry(cell_index)
            .measure_with_settings(&self.settings)
            .map_err(|err| err.with_cell(cell_index))
    }

    /// Pushes a basis forward to a point of a cell, with the geometry settings of the mesh.
    pub fn cell_pushforward<B>(
        &self,
        cell_index: usize,
        basis: &B,
        reference_coords: &[T],
    ) -> Result<Pushforward<T, D>, FemError>
    where
        B: ?Sized + ReferenceFiniteElement<T>,
    {
        self.cell_geometry(cell_index)
            .pushforward_with_settings(basis, reference_coords, &self.settings)
            .map_err(|err| err.with_cell(cell_index))
    }

    /// Sum of the measures of all cells.
    pub fn measure(&self) -> Result<T, FemError> {
        (0..self.num_cells()).try_fold(T::zero(), |acc, c| Ok(acc + self.cell_measure(c)?))
    }

    /// Returns a new mesh in which only the desired cells are kept. The vertices are removed or
    /// relabeled as necessary, preserving their relative order.
    pub fn keep_cells(&self, cell_indices: &[usize]) -> Result<Self, FemError> {
        if let Some(&invalid) = cell_indices.iter().find(|&&c| c >= self.num_cells()) {
            return Err(FemError::topology(format!(
                "cell index {} is out of bounds for mesh with {} cells",
                invalid,
                self.num_cells()
            )));
        }

        let mut keep = vec![false; self.vertices.len()];
        for &cell_index in cell_indices {
            for &v in self.cell_vertices(cell_index) {
                keep[v] = true;
            }
        }

        let mut new_labels = vec![usize::MAX; self.vertices.len()];
        let mut new_vertices = Vec::new();
        for (old, _) in keep.iter().enumerate().filter(|&(_, &k)| k) {
            new_labels[old] = new_vertices.len();
            new_vertices.push(self.vertices[old].clone());
        }

        let new_cells = cell_indices
            .iter()
            .map(|&c| {
                let mut cell = self.cells[c].clone();
                for v in cell.vertex_indices_mut() {
                    *v = new_labels[*v];
                }
                cell
            })
            .collect();

        let topological_dim = if cell_indices.is_empty() { 0 } else { self.topological_dim };
        Ok(Self::from_parts_unchecked(new_vertices, new_cells, topological_dim).with_geometry_settings(self.settings))
    }
}

/// Checks cell connectivity and returns the common reference dimension of the cells.
fn validate_connectivity(num_vertices: usize, geometric_dim: usize, cells: &[CellConnectivity]) -> Result<usize, FemError> {
    let mut topological_dim = None;
    for (cell_index, cell) in cells.iter().enumerate() {
        let shape = cell.shape();
        let indices = cell.vertex_indices();
        if indices.len() != shape.num_vertices() {
            return Err(FemError::topology(format!(
                "cell {} has {} vertices, but a {:?} has {}",
                cell_index,
                indices.len(),
                shape,
                shape.num_vertices()
            )));
        }
        if let Some(&v) = indices.iter().find(|&&v| v >= num_vertices) {
            return Err(FemError::topology(format!(
                "cell {} refers to vertex {}, but the mesh has {} vertices",
                cell_index, v, num_vertices
            )));
        }
        let mut sorted: SmallVec<[usize; 8]> = SmallVec::from_slice(indices);
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(FemError::topology(format!(
                "cell {} refers to the same vertex more than once",
                cell_index
            )));
        }
        let d = shape.reference_dim();
        if d > geometric_dim {
            return Err(FemError::topology(format!(
                "cell {} is a {:?}, which cannot be embedded in {} dimensions",
                cell_index, shape, geometric_dim
            )));
        }
        match topological_dim {
            None => topological_dim = Some(d),
            Some(existing) if existing != d => {
                return Err(FemError::topology(format!(
                    "cell {} has dimension {}, but previous cells have dimension {}",
                    cell_index, d, existing
                )));
            }
            Some(_) => {}
        }
    }
    Ok(topological_dim.unwrap_or(0))
}
