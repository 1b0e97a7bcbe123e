//! Basic procedural mesh generation routines.
//!
//! All generated meshes are numbered lexicographically: vertices are ordered with the x index
//! varying fastest, and cells likewise. Cells are positively oriented.
use crate::connectivity::CellConnectivity;
use crate::error::FemError;
use crate::mesh::{Mesh, Mesh1d, Mesh2d, Mesh3d};
use crate::util::real;
use crate::Real;
use nalgebra::{Point1, Point2, Point3, Vector2, Vector3};

/// Creates a mesh of `num_cells` equal intervals covering `[0, 1]`.
pub fn create_unit_interval_mesh<T: Real>(num_cells: usize) -> Mesh1d<T> {
    if num_cells == 0 {
        return Mesh::from_parts_unchecked(Vec::new(), Vec::new(), 0);
    }
    let vertices = (0..=num_cells)
        .map(|i| Point1::new(real::<T>(i as f64 / num_cells as f64)))
        .collect();
    let cells = (0..num_cells)
        .map(|i| CellConnectivity::interval([i, i + 1]))
        .collect();
    Mesh::from_parts_unchecked(vertices, cells, 1)
}

pub fn create_unit_square_uniform_quad_mesh_2d<T: Real>(cells_per_dim: usize) -> Mesh2d<T> {
    let (vertices, cells) = quad_grid_2d(T::one(), [cells_per_dim; 2], &Vector2::zeros());
    let dim = if cells.is_empty() { 0 } else { 2 };
    Mesh::from_parts_unchecked(vertices, cells, dim)
}

/// Creates a triangle mesh of the unit square by splitting each cell of the uniform quad mesh
/// along the diagonal through its lower left corner.
pub fn create_unit_square_uniform_tri_mesh_2d<T: Real>(cells_per_dim: usize) -> Mesh2d<T> {
    let (vertices, quads) = quad_grid_2d(T::one(), [cells_per_dim; 2], &Vector2::zeros());
    let cells: Vec<_> = quads
        .iter()
        .flat_map(|quad| {
            let v = quad.vertex_indices();
            [
                CellConnectivity::triangle([v[0], v[1], v[2]]),
                CellConnectivity::triangle([v[0], v[2], v[3]]),
            ]
        })
        .collect();
    let dim = if cells.is_empty() { 0 } else { 2 };
    Mesh::from_parts_unchecked(vertices, cells, dim)
}

/// Generates an axis-aligned rectangular uniform mesh given a unit length,
/// dimensions as multipliers of the unit length and the number of cells per unit length.
///
/// The mesh covers `[0, units_x * unit_length] x [0, units_y * unit_length]` translated by
/// `bottom_left`.
pub fn create_rectangular_uniform_quad_mesh_2d<T: Real>(
    unit_length: T,
    units_x: usize,
    units_y: usize,
    cells_per_unit: usize,
    bottom_left: &Vector2<T>,
) -> Result<Mesh2d<T>, FemError> {
    let cell_size = unit_length / real::<T>(cells_per_unit.max(1) as f64);
    let (vertices, cells) = quad_grid_2d(cell_size, [units_x * cells_per_unit, units_y * cells_per_unit], bottom_left);
    Mesh::try_from_vertices_and_connectivity(vertices, cells)
}

pub fn create_unit_box_uniform_hex_mesh_3d<T: Real>(cells_per_dim: usize) -> Mesh3d<T> {
    let (vertices, cells) = hex_grid_3d(T::one() / real::<T>(cells_per_dim.max(1) as f64), [cells_per_dim; 3]);
    let dim = if cells.is_empty() { 0 } else { 3 };
    Mesh::from_parts_unchecked(vertices, cells, dim)
}

/// Generates an axis-aligned box of hexahedra with one corner at the origin, given a unit
/// length, dimensions as multipliers of the unit length and the number of cells per unit length.
pub fn create_rectangular_uniform_hex_mesh<T: Real>(
    unit_length: T,
    units_x: usize,
    units_y: usize,
    units_z: usize,
    cells_per_unit: usize,
) -> Result<Mesh3d<T>, FemError> {
    let cell_size = unit_length / real::<T>(cells_per_unit.max(1) as f64);
    let (vertices, cells) = hex_grid_3d(
        cell_size,
        [units_x * cells_per_unit, units_y * cells_per_unit, units_z * cells_per_unit],
    );
    Mesh::try_from_vertices_and_connectivity(vertices, cells)
}

/// Creates a tetrahedral mesh of the unit cube by splitting every cell of the uniform hexahedral
/// mesh into six tetrahedra sharing the diagonal from its lowest to its highest corner.
///
/// All cubes are split the same way, so the resulting mesh is conforming.
pub fn create_unit_box_uniform_tet_mesh_3d<T: Real>(cells_per_dim: usize) -> Mesh3d<T> {
    let (vertices, hexes) = hex_grid_3d(T::one() / real::<T>(cells_per_dim.max(1) as f64), [cells_per_dim; 3]);

    // Local hexahedron vertex for each corner of the unit cube, indexed by x + 2y + 4z
    const CORNER_TO_HEX_VERTEX: [usize; 8] = [0, 1, 3, 2, 4, 5, 7, 6];
    // Axis permutations and whether they are even
    const PERMUTATIONS: [([usize; 3], bool); 6] = [
        ([0, 1, 2], true),
        ([0, 2, 1], false),
        ([1, 0, 2], false),
        ([1, 2, 0], true),
        ([2, 0, 1], true),
        ([2, 1, 0], false),
    ];

    let cells: Vec<_> = hexes
        .iter()
        .flat_map(|hex| {
            let v = hex.vertex_indices();
            PERMUTATIONS.iter().map(move |&(axes, even)| {
                // Walk from the lowest to the highest corner along the permuted axes
                let mut corner = 0;
                let mut path = [0; 4];
                for (k, &axis) in axes.iter().enumerate() {
                    corner |= 1 << axis;
                    path[k + 1] = corner;
                }
                let mut tet = path.map(|c| v[CORNER_TO_HEX_VERTEX[c]]);
                if !even {
                    tet.swap(1, 2);
                }
                CellConnectivity::tetrahedron(tet)
            })
        })
        .collect();
    let dim = if cells.is_empty() { 0 } else { 3 };
    Mesh::from_parts_unchecked(vertices, cells, dim)
}

fn quad_grid_2d<T: Real>(
    cell_size: T,
    [nx, ny]: [usize; 2],
    bottom_left: &Vector2<T>,
) -> (Vec<Point2<T>>, Vec<CellConnectivity>) {
    if nx == 0 || ny == 0 {
        return (Vec::new(), Vec::new());
    }
    let to_global_vertex_index = |i: usize, j: usize| (nx + 1) * j + i;

    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            let offset = Vector2::new(real::<T>(i as f64), real::<T>(j as f64)) * cell_size;
            vertices.push(Point2::from(bottom_left + offset));
        }
    }

    let mut cells = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            cells.push(CellConnectivity::quadrilateral([
                to_global_vertex_index(i, j),
                to_global_vertex_index(i + 1, j),
                to_global_vertex_index(i + 1, j + 1),
                to_global_vertex_index(i, j + 1),
            ]));
        }
    }
    (vertices, cells)
}

fn hex_grid_3d<T: Real>(cell_size: T, [nx, ny, nz]: [usize; 3]) -> (Vec<Point3<T>>, Vec<CellConnectivity>) {
    if nx == 0 || ny == 0 || nz == 0 {
        return (Vec::new(), Vec::new());
    }
    let to_global_vertex_index = |i: usize, j: usize, k: usize| (nx + 1) * (ny + 1) * k + (nx + 1) * j + i;

    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                let coords = Vector3::new(real::<T>(i as f64), real::<T>(j as f64), real::<T>(k as f64)) * cell_size;
                vertices.push(Point3::from(coords));
            }
        }
    }

    let mut cells = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                cells.push(CellConnectivity::hexahedron([
                    to_global_vertex_index(i, j, k),
                    to_global_vertex_index(i + 1, j, k),
                    to_global_vertex_index(i + 1, j + 1, k),
                    to_global_vertex_index(i, j + 1, k),
                    to_global_vertex_index(i, j, k + 1),
                    to_global_vertex_index(i + 1, j, k + 1),
                    to_global_vertex_index(i + 1, j + 1, k + 1),
                    to_global_vertex_index(i, j + 1, k + 1),
                ]));
            }
        }
    }
    (vertices, cells)
}
