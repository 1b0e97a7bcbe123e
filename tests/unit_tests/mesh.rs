use galerkin::connectivity::{CellConnectivity, ReferenceCell};
use galerkin::element::GeometrySettings;
use galerkin::error::FemError;
use galerkin::mesh::procedural::{
    create_rectangular_uniform_quad_mesh_2d, create_unit_box_uniform_hex_mesh_3d, create_unit_box_uniform_tet_mesh_3d,
    create_unit_interval_mesh, create_unit_square_uniform_quad_mesh_2d, create_unit_square_uniform_tri_mesh_2d,
};
use galerkin::mesh::{Mesh2d, Mesh3d, MeshEntity};
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point2, Point3, Vector2};
use proptest::prelude::*;


fn two_triangles() -> Mesh2d<f64> {
    let vertices = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(1.0, 1.0),
        Point2::new(0.0, 1.0),
    ];
    let cells = vec![CellConnectivity::triangle([0, 1, 2]), CellConnectivity::triangle([0, 2, 3])];
    Mesh2d::try_from_vertices_and_connectivity(vertices, cells).unwrap()
}

#[test]
fn cell_referring_to_missing_vertex_is_rejected() {
    let vertices = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
    let cells = vec![CellConnectivity::triangle([0, 1, 3])];
    let result = Mesh2d::try_from_vertices_and_connectivity(vertices, cells);
    assert!(matches!(result, Err(FemError::Topology { .. })));
}

#[test]
fn cell_with_repeated_vertex_is_rejected() {
    let vertices = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
    let cells = vec![CellConnectivity::triangle([0, 1, 1])];
    let result = Mesh2d::try_from_vertices_and_connectivity(vertices, cells);
    assert!(matches!(result, Err(FemError::Topology { .. })));
}

#[test]
fn cell_with_wrong_vertex_count_is_rejected() {
    let vertices = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
    let cells = vec![CellConnectivity::new(ReferenceCell::Quadrilateral, [0, 1, 2])];
    let result = Mesh2d::try_from_vertices_and_connectivity(vertices, cells);
    assert!(matches!(result, Err(FemError::Topology { .. })));
}

#[test]
fn mixed_reference_dimensions_are_rejected() {
    let vertices = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
    let cells = vec![CellConnectivity::triangle([0, 1, 2]), CellConnectivity::interval([0, 1])];
    let result = Mesh2d::try_from_vertices_and_connectivity(vertices, cells);
    assert!(matches!(result, Err(FemError::Topology { .. })));
}

#[test]
fn three_dimensional_cells_cannot_be_embedded_in_the_plane() {
    let vertices = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(1.0, 1.0),
    ];
    let cells = vec![CellConnectivity::tetrahedron([0, 1, 2, 3])];
    let result = Mesh2d::try_from_vertices_and_connectivity(vertices, cells);
    assert!(matches!(result, Err(FemError::Topology { .. })));
}

#[test]
fn collinear_triangle_is_degenerate() {
    let vertices = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(2.0, 0.0),
    ];
    let cells = vec![CellConnectivity::triangle([0, 1, 2]), CellConnectivity::triangle([0, 1, 3])];
    let result = Mesh2d::try_from_vertices_and_connectivity(vertices, cells);
    assert!(matches!(result, Err(FemError::DegenerateGeometry { cell: Some(1), .. })));
}

#[test]
fn clockwise_triangle_is_degenerate() {
    let vertices = vec![Point2::new(0.0, 0.0), Point2::new(0.0, 1.0), Point2::new(1.0, 0.0)];
    let cells = vec![CellConnectivity::triangle([0, 1, 2])];
    let result = Mesh2d::try_from_vertices_and_connectivity(vertices, cells);
    assert!(matches!(result, Err(FemError::DegenerateGeometry { cell: Some(0), .. })));
}

#[test]
fn nearly_flat_triangle_is_accepted_with_relaxed_tolerance() {
    let vertices = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.5, 1e-6)];
    let cells = vec![CellConnectivity::triangle([0, 1, 2])];
    let strict = GeometrySettings {
        relative_tolerance: 1e-3,
    };
    let relaxed = GeometrySettings {
        relative_tolerance: 1e-9,
    };
    let result =
        Mesh2d::try_from_vertices_and_connectivity_with_settings(vertices.clone(), cells.clone(), &strict);
    assert!(matches!(result, Err(FemError::DegenerateGeometry { .. })));
    assert!(Mesh2d::try_from_vertices_and_connectivity_with_settings(vertices, cells, &relaxed).is_ok());
}

#[test]
fn empty_mesh_is_valid() {
    let mesh = Mesh2d::<f64>::try_from_vertices_and_connectivity(Vec::new(), Vec::new()).unwrap();
    assert_eq!(mesh.num_cells(), 0);
    assert_eq!(mesh.num_vertices(), 0);
    assert_eq!(mesh.num_facets(), 0);
    assert!(mesh.boundary_facets().is_empty());
    assert_eq!(mesh.measure().unwrap(), 0.0);
}

#[test]
fn basic_queries_on_two_triangles() {
    let mesh = two_triangles();
    assert_eq!(mesh.num_cells(), 2);
    assert_eq!(mesh.num_vertices(), 4);
    assert_eq!(mesh.topological_dim(), 2);
    assert_eq!(mesh.cell_vertices(1), &[0, 2, 3]);
    assert_eq!(mesh.vertex(2), &Point2::new(1.0, 1.0));
    assert_eq!(mesh.cell(0).shape(), ReferenceCell::Triangle);
    assert_eq!(mesh.num_edges(), 5);
    assert_eq!(mesh.num_facets(), 5);
    assert_eq!(mesh.boundary_facets().len(), 4);
    assert_eq!(mesh.boundary_vertices(), vec![0, 1, 2, 3]);
}

#[test]
fn facets_are_numbered_in_order_of_first_appearance() {
    let mesh = two_triangles();
    // Cell 0 contributes (0, 1), (1, 2), (2, 0); cell 1 then adds (2, 3) and (3, 0)
    assert_eq!(mesh.cell_facets(0), &[0, 1, 2]);
    assert_eq!(mesh.cell_facets(1), &[2, 3, 4]);
    let mut diagonal = mesh.facet_vertices(2).to_vec();
    diagonal.sort_unstable();
    assert_eq!(diagonal, vec![0, 2]);
    assert_eq!(mesh.facet_cells(2), &[0, 1]);
    assert_eq!(mesh.facet_incidences(2), vec![(0, 2), (1, 0)]);
}

#[test]
fn adjacency_queries() {
    let mesh = create_unit_square_uniform_quad_mesh_2d::<f64>(2);
    // The center vertex belongs to all four cells
    assert_eq!(mesh.cells_adjacent_to(MeshEntity::Vertex(4)).unwrap(), &[0, 1, 2, 3]);
    assert_eq!(mesh.cells_adjacent_to(MeshEntity::Vertex(0)).unwrap(), &[0]);

    let mut neighbors = mesh.cells_adjacent_to(MeshEntity::Cell(0)).unwrap().to_vec();
    neighbors.sort_unstable();
    assert_eq!(neighbors, vec![1, 2]);

    for &facet in mesh.boundary_facets() {
        assert_eq!(mesh.cells_adjacent_to(MeshEntity::Facet(facet)).unwrap().len(), 1);
    }
    for edge in 0..mesh.num_edges() {
        let cells = mesh.cells_adjacent_to(MeshEntity::Edge(edge)).unwrap();
        assert!(cells.len() == 1 || cells.len() == 2);
    }
}

#[test]
fn adjacency_of_out_of_range_entity_is_topology_error() {
    let mesh = create_unit_square_uniform_quad_mesh_2d::<f64>(2);
    for entity in [
        MeshEntity::Vertex(9),
        MeshEntity::Edge(mesh.num_edges()),
        MeshEntity::Facet(mesh.num_facets()),
        MeshEntity::Cell(4),
    ] {
        assert!(matches!(mesh.cells_adjacent_to(entity), Err(FemError::Topology { .. })));
    }
}

#[test]
fn boundary_facets_where_selects_by_barycenter() {
    let mesh = create_unit_square_uniform_tri_mesh_2d::<f64>(3);
    let left = mesh.boundary_facets_where(|x| x.x < 1e-12);
    assert_eq!(left.len(), 3);
    for facet in left {
        for &v in mesh.facet_vertices(facet) {
            assert_eq!(mesh.vertex(v).x, 0.0);
        }
    }
}

#[test]
fn unit_square_meshes_have_expected_sizes() {
    for n in 1..5 {
        let tri = create_unit_square_uniform_tri_mesh_2d::<f64>(n);
        assert_eq!(tri.num_vertices(), (n + 1) * (n + 1));
        assert_eq!(tri.num_cells(), 2 * n * n);
        assert_eq!(tri.num_edges(), 3 * n * n + 2 * n);
        assert_eq!(tri.boundary_facets().len(), 4 * n);

        let quad = create_unit_square_uniform_quad_mesh_2d::<f64>(n);
        assert_eq!(quad.num_cells(), n * n);
        assert_eq!(quad.num_edges(), 2 * n * (n + 1));
        assert_eq!(quad.boundary_facets().len(), 4 * n);
    }
}

#[test]
fn unit_box_meshes_have_expected_sizes() {
    let hex: Mesh3d<f64> = create_unit_box_uniform_hex_mesh_3d(2);
    assert_eq!(hex.num_vertices(), 27);
    assert_eq!(hex.num_cells(), 8);
    assert_eq!(hex.num_facets(), 36);
    assert_eq!(hex.boundary_facets().len(), 24);

    let tet: Mesh3d<f64> = create_unit_box_uniform_tet_mesh_3d(2);
    assert_eq!(tet.num_vertices(), 27);
    assert_eq!(tet.num_cells(), 48);
    // Every face of the cube is split into two triangles per square
    assert_eq!(tet.boundary_facets().len(), 6 * 4 * 2);
}

#[test]
fn generated_meshes_cover_unit_domains() {
    assert_scalar_eq!(create_unit_interval_mesh::<f64>(7).measure().unwrap(), 1.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(
        create_unit_square_uniform_tri_mesh_2d::<f64>(4).measure().unwrap(),
        1.0,
        comp = abs,
        tol = 1e-14
    );
    assert_scalar_eq!(
        create_unit_box_uniform_tet_mesh_3d::<f64>(2).measure().unwrap(),
        1.0,
        comp = abs,
        tol = 1e-14
    );
    assert_scalar_eq!(
        create_unit_box_uniform_hex_mesh_3d::<f64>(2).measure().unwrap(),
        1.0,
        comp = abs,
        tol = 1e-14
    );
}

#[test]
fn generated_meshes_pass_validation() {
    let tri = create_unit_square_uniform_tri_mesh_2d::<f64>(3);
    let revalidated =
        Mesh2d::try_from_vertices_and_connectivity(tri.vertices().to_vec(), tri.cells().to_vec()).unwrap();
    assert_eq!(revalidated, tri);

    let tet = create_unit_box_uniform_tet_mesh_3d::<f64>(2);
    assert!(Mesh3d::try_from_vertices_and_connectivity(tet.vertices().to_vec(), tet.cells().to_vec()).is_ok());
}

#[test]
fn keep_cells_relabels_vertices() {
    let mesh = create_unit_square_uniform_quad_mesh_2d::<f64>(2);
    let kept = mesh.keep_cells(&[3]).unwrap();
    assert_eq!(kept.num_cells(), 1);
    assert_eq!(kept.num_vertices(), 4);
    assert_eq!(kept.cell_vertices(0), &[0, 1, 3, 2]);
    assert_eq!(kept.vertex(0), &Point2::new(0.5, 0.5));
    assert!(matches!(mesh.keep_cells(&[4]), Err(FemError::Topology { .. })));
}

#[test]
fn embedded_interval_mesh_has_arc_length_measure() {
    let vertices = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 2.0, 2.0), Point3::new(1.0, 2.0, 5.0)];
    let cells = vec![CellConnectivity::interval([0, 1]), CellConnectivity::interval([1, 2])];
    let mesh = Mesh3d::try_from_vertices_and_connectivity(vertices, cells).unwrap();
    assert_eq!(mesh.topological_dim(), 1);
    assert_scalar_eq!(mesh.measure().unwrap(), 6.0, comp = abs, tol = 1e-14);
    assert_eq!(mesh.boundary_vertices(), vec![0, 2]);
}

proptest! {
    #[test]
    fn rectangular_meshes_have_expected_measure(
        units_x in 1..4usize,
        units_y in 1..4usize,
        cells_per_unit in 1..4usize,
        unit_length in 0.1..3.0f64,
    ) {
        let mesh = create_rectangular_uniform_quad_mesh_2d(
            unit_length, units_x, units_y, cells_per_unit, &Vector2::new(-1.0, 2.0)).unwrap();
        prop_assert_eq!(mesh.num_cells(), units_x * units_y * cells_per_unit * cells_per_unit);
        let expected = (units_x * units_y) as f64 * unit_length * unit_length;
        prop_assert!((mesh.measure().unwrap() - expected).abs() <= 1e-12 * expected.max(1.0));
    }

    #[test]
    fn every_interior_facet_has_two_cells(mesh in galerkin::proptest::unit_square_mesh_strategy(4)) {
        let boundary: Vec<usize> = mesh.boundary_facets().to_vec();
        for facet in 0..mesh.num_facets() {
            let expected = if boundary.binary_search(&facet).is_ok() { 1 } else { 2 };
            prop_assert_eq!(mesh.facet_cells(facet).len(), expected);
        }
    }
}
