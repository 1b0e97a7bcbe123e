//! `proptest` strategies for meshes and cell geometries.
use crate::connectivity::ReferenceCell;
use crate::element::ElementGeometry;
use crate::mesh::procedural::{
    create_rectangular_uniform_quad_mesh_2d, create_unit_square_uniform_quad_mesh_2d,
    create_unit_square_uniform_tri_mesh_2d,
};
use crate::mesh::Mesh2d;
use ::proptest::prelude::*;
use nalgebra::{Point2, Point3, Vector2, U2};
use std::cmp::max;
use std::f64::consts::PI;

pub fn point2() -> impl Strategy<Value = Point2<f64>> {
    // Pick a reasonably small range to pick coordinates from,
    // otherwise we can easily get floating point numbers that are
    // so ridiculously large as to break anything we might want to do with them
    let range = -10.0..10.0;
    [range.clone(), range.clone()].prop_map(|[x, y]| Point2::new(x, y))
}

pub fn point3() -> impl Strategy<Value = Point3<f64>> {
    let range = -10.0..10.0;
    [range.clone(), range.clone(), range.clone()].prop_map(|[x, y, z]| Point3::new(x, y, z))
}

pub fn reference_cell() -> impl Strategy<Value = ReferenceCell> {
    proptest::sample::select(ReferenceCell::ALL.to_vec())
}

/// Counterclockwise triangles whose interior angle at the first vertex is bounded away from
/// zero and pi, and whose sides at the first vertex are bounded away from zero length.
pub fn nondegenerate_triangle2d() -> impl Strategy<Value = ElementGeometry<f64, U2>> {
    let lengths = [0.1..5.0, 0.1..5.0];
    let rotation = 0.0..2.0 * PI;
    let opening = 0.2..PI - 0.2;
    (point2(), lengths, rotation, opening).prop_map(|(origin, [a, b], rotation, opening)| {
        let e1 = Vector2::new(rotation.cos(), rotation.sin()) * a;
        let e2 = Vector2::new((rotation + opening).cos(), (rotation + opening).sin()) * b;
        ElementGeometry::try_new(ReferenceCell::Triangle, vec![origin, origin + e1, origin + e2])
            .expect("Triangle has the correct number of vertices")
    })
}

/// Parallelograms with the same bounds as [`nondegenerate_triangle2d`].
pub fn nondegenerate_parallelogram2d() -> impl Strategy<Value = ElementGeometry<f64, U2>> {
    nondegenerate_triangle2d().prop_map(|triangle| {
        let [a, b, c]: [Point2<f64>; 3] = [triangle.vertices()[0], triangle.vertices()[1], triangle.vertices()[2]];
        let d = b + (c - a);
        ElementGeometry::try_new(ReferenceCell::Quadrilateral, vec![a, b, d, c])
            .expect("Quadrilateral has the correct number of vertices")
    })
}

/// Unit square meshes of triangles or quadrilaterals with up to `max_cells_per_dim` cells
/// along each axis.
pub fn unit_square_mesh_strategy(max_cells_per_dim: usize) -> impl Strategy<Value = Mesh2d<f64>> {
    (1..=max(1, max_cells_per_dim), any::<bool>()).prop_map(|(cells_per_dim, triangles)| {
        if triangles {
            create_unit_square_uniform_tri_mesh_2d(cells_per_dim)
        } else {
            create_unit_square_uniform_quad_mesh_2d(cells_per_dim)
        }
    })
}

// Returns a strategy in which each value is a triplet (cells_per_unit, units_x, units_y)
// such that cells_per_unit^2 * units_x * units_y <= max_cells
fn rectangular_uniform_mesh_cell_distribution_strategy(
    max_cells: usize,
) -> impl Strategy<Value = (usize, usize, usize)> {
    let max_cells_per_unit = f64::floor(f64::sqrt(max_cells as f64)) as usize;
    (1..=max(1, max_cells_per_unit))
        .prop_flat_map(move |cells_per_unit| (Just(cells_per_unit), 0..=max_cells / (cells_per_unit * cells_per_unit)))
        .prop_flat_map(move |(cells_per_unit, units_x)| {
            let units_y_strategy = 0..=max_cells / (cells_per_unit * cells_per_unit * max(1, units_x));
            (Just(cells_per_unit), Just(units_x), units_y_strategy)
        })
}

/// Rectangular quadrilateral meshes with at most `max_cells` cells. Meshes may be empty.
pub fn rectangular_uniform_mesh_strategy(unit_length: f64, max_cells: usize) -> impl Strategy<Value = Mesh2d<f64>> {
    rectangular_uniform_mesh_cell_distribution_strategy(max_cells).prop_map(
        move |(cells_per_unit, units_x, units_y)| {
            create_rectangular_uniform_quad_mesh_2d(
                unit_length,
                units_x,
                units_y,
                cells_per_unit,
                &Vector2::new(0.0, 0.0),
            )
            .expect("Uniform meshes are valid")
        },
    )
}
