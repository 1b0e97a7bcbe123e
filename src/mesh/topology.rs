//! Derived mesh topology: edges, facets and cell adjacency.
use crate::connectivity::CellConnectivity;
use fenris_nested_vec::NestedVec;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Groups `(row, value)` pairs by row, keeping the order in which the values of a row appear.
pub(crate) fn group_by_row(num_rows: usize, pairs: &[(usize, usize)]) -> NestedVec<usize> {
    let mut rows = vec![Vec::new(); num_rows];
    for &(row, value) in pairs {
        rows[row].push(value);
    }
    NestedVec::from(rows)
}

/// Numbering of one kind of sub-entity (edges or facets) of a mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntityTable {
    /// Vertices of each entity, ordered as in the first cell in which it appears.
    pub entity_vertices: NestedVec<usize>,
    /// Entities of each cell, in local entity order.
    pub cell_entities: NestedVec<usize>,
    /// Cells incident to each entity, in increasing order.
    pub entity_cells: NestedVec<usize>,
}

impl EntityTable {
    /// Numbers entities in order of first appearance while visiting cells in order and local
    /// entities in reference order.
    pub fn build<F>(cells: &[CellConnectivity], mut local_entities: F) -> Self
    where
        F: FnMut(&CellConnectivity) -> Vec<SmallVec<[usize; 4]>>,
    {
        let mut lookup: FxHashMap<SmallVec<[usize; 4]>, usize> = FxHashMap::default();
        let mut entity_vertices = NestedVec::new();
        let mut cell_entities = NestedVec::new();
        let mut incidences = Vec::new();

        for (cell_index, cell) in cells.iter().enumerate() {
            let mut entities_of_cell = cell_entities.begin_array();
            for vertices in local_entities(cell) {
                let mut key = vertices.clone();
                key.sort_unstable();
                let next_index = entity_vertices.len();
                let index = *lookup.entry(key).or_insert_with(|| next_index);
                if index == next_index {
                    entity_vertices.push(&vertices);
                }
                entities_of_cell.push_single(index);
                incidences.push((index, cell_index));
            }
        }

        let num_entities = entity_vertices.len();
        Self {
            entity_vertices,
            cell_entities,
            entity_cells: group_by_row(num_entities, &incidences),
        }
    }

    pub fn num_entities(&self) -> usize {
        self.entity_vertices.len()
    }
}

/// All derived topology of a mesh, computed together on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MeshTopology {
    pub edges: EntityTable,
    pub facets: EntityTable,
    pub vertex_cells: NestedVec<usize>,
    pub cell_neighbors: NestedVec<usize>,
    pub boundary_facets: Vec<usize>,
}

impl MeshTopology {
    pub fn build(num_vertices: usize, cells: &[CellConnectivity]) -> Self {
        let edges = EntityTable::build(cells, |cell| {
            (0..cell.shape().edges().len())
                .map(|e| SmallVec::from_slice(&cell.edge_vertices(e)))
                .collect()
        });
        let facets = EntityTable::build(cells, |cell| {
            (0..cell.shape().num_facets())
                .map(|f| cell.facet_vertices(f))
                .collect()
        });

        let vertex_incidences: Vec<(usize, usize)> = cells
            .iter()
            .enumerate()
            .flat_map(|(cell_index, cell)| {
                cell.vertex_indices()
                    .iter()
                    .map(move |&v| (v, cell_index))
            })
            .collect();
        let vertex_cells = group_by_row(num_vertices, &vertex_incidences);

        let mut cell_neighbors = NestedVec::new();
        for (cell_index, cell_facets) in facets.cell_entities.iter().enumerate() {
            let mut neighbors = cell_neighbors.begin_array();
            for &facet in cell_facets {
                for &other in facets.entity_cells.get(facet).unwrap_or(&[]) {
                    if other != cell_index {
                        neighbors.push_single(other);
                    }
                }
            }
        }

        let boundary_facets = facets
            .entity_cells
            .iter()
            .enumerate()
            .filter(|(_, incident)| incident.len() == 1)
            .map(|(facet, _)| facet)
            .collect();

        Self {
            edges,
            facets,
            vertex_cells,
            cell_neighbors,
            boundary_facets,
        }
    }
}
