use galerkin::connectivity::{CellConnectivity, ReferenceCell};
use galerkin::element::{GeometrySettings, LagrangeBasis};
use galerkin::error::FemError;
use galerkin::mesh::procedural::{
    create_unit_box_uniform_hex_mesh_3d, create_unit_box_uniform_tet_mesh_3d, create_unit_interval_mesh,
    create_unit_square_uniform_quad_mesh_2d, create_unit_square_uniform_tri_mesh_2d,
};
use galerkin::mesh::{Mesh, Mesh2d};
use galerkin::space::{Continuity, FiniteElementSpace};
use galerkin::allocators::DimAllocator;
use galerkin::SmallDim;
use matrixcompare::assert_scalar_eq;
use nalgebra::{DVector, DefaultAllocator, Point2, Point3, Vector2};
use proptest::prelude::*;
use std::sync::Arc;

/// Checks that the DOF map is surjective and that the node of every local DOF coincides with
/// the node of its global DOF.
fn check_dof_map<D>(space: &FiniteElementSpace<f64, D>)
where
    D: SmallDim,
    DefaultAllocator: DimAllocator<f64, D>,
{
    let mut seen = vec![false; space.dof_count()];
    for cell in 0..space.num_cells() {
        let geometry = space.mesh().cell_geometry(cell);
        let basis = space.basis_for_cell(cell);
        let global = space.local_to_global(cell);
        assert_eq!(global.len(), basis.local_dofs().len());
        for (local, &g) in global.iter().enumerate() {
            seen[g] = true;
            let x = geometry.map_reference_coords(basis.node(local));
            assert!((x - space.dof_point(g)).norm() < 1e-12);
        }
    }
    assert!(seen.into_iter().all(|s| s));
}

#[test]
fn continuous_triangle_spaces_have_expected_dof_counts() {
    for n in 1..4 {
        let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(n));
        let (v, e, c) = (mesh.num_vertices(), mesh.num_edges(), mesh.num_cells());
        for p in 1..=4 {
            let space = FiniteElementSpace::try_new(Arc::clone(&mesh), p, Continuity::Continuous).unwrap();
            let expected = v + (p - 1) * e + (p - 1) * p.saturating_sub(2) / 2 * c;
            assert_eq!(space.dof_count(), expected);
            assert_eq!(space.degree(), p);
            check_dof_map(&space);
        }
    }
}

#[test]
fn continuous_tensor_spaces_have_expected_dof_counts() {
    for n in 1..4 {
        let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(n));
        for p in 1..=3 {
            let space = FiniteElementSpace::try_new(Arc::clone(&mesh), p, Continuity::Continuous).unwrap();
            assert_eq!(space.dof_count(), (n * p + 1).pow(2));
            check_dof_map(&space);
        }
    }
    let hex = Arc::new(create_unit_box_uniform_hex_mesh_3d::<f64>(2));
    let space = FiniteElementSpace::try_new(hex, 2, Continuity::Continuous).unwrap();
    assert_eq!(space.dof_count(), 125);
    check_dof_map(&space);
}

#[test]
fn continuous_tetrahedron_space_shares_face_dofs() {
    let mesh = Arc::new(create_unit_box_uniform_tet_mesh_3d::<f64>(1));
    let space = FiniteElementSpace::try_new(Arc::clone(&mesh), 3, Continuity::Continuous).unwrap();
    let expected = mesh.num_vertices() + 2 * mesh.num_edges() + mesh.num_facets();
    assert_eq!(space.dof_count(), expected);
    check_dof_map(&space);
}

#[test]
fn discontinuous_spaces_own_all_local_dofs() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(3));
    let space = FiniteElementSpace::try_new(Arc::clone(&mesh), 2, Continuity::Discontinuous).unwrap();
    assert_eq!(space.continuity(), Continuity::Discontinuous);
    assert_eq!(space.dof_count(), mesh.num_cells() * 6);
    for cell in 0..space.num_cells() {
        assert_eq!(space.local_to_global(cell), &(6 * cell..6 * (cell + 1)).collect::<Vec<_>>()[..]);
    }
    check_dof_map(&space);
}

#[test]
fn mixed_shape_mesh_shares_edge_dofs_between_shapes() {
    // A unit square split into a quadrilateral and two triangles
    let vertices = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(1.0, 1.0),
        Point2::new(0.0, 1.0),
        Point2::new(2.0, 0.0),
        Point2::new(2.0, 1.0),
    ];
    let cells = vec![
        CellConnectivity::quadrilateral([0, 1, 2, 3]),
        CellConnectivity::triangle([1, 4, 5]),
        CellConnectivity::triangle([1, 5, 2]),
    ];
    let mesh = Arc::new(Mesh2d::try_from_vertices_and_connectivity(vertices, cells).unwrap());
    let space = FiniteElementSpace::try_new(Arc::clone(&mesh), 2, Continuity::Continuous).unwrap();
    // Vertices, edges and the interior node of the quadrilateral
    assert_eq!(space.dof_count(), mesh.num_vertices() + mesh.num_edges() + 1);
    assert!(space.basis_for_shape(ReferenceCell::Quadrilateral).is_some());
    assert!(space.basis_for_shape(ReferenceCell::Tetrahedron).is_none());
    assert_eq!(space.max_local_dofs(), 9);
    check_dof_map(&space);
}

#[test]
fn numbering_follows_first_appearance() {
    let mesh = Arc::new(create_unit_interval_mesh::<f64>(3));
    let space = FiniteElementSpace::try_new(mesh, 2, Continuity::Continuous).unwrap();
    assert_eq!(space.local_to_global(0), &[0, 1, 2]);
    assert_eq!(space.local_to_global(1), &[1, 3, 4]);
    assert_eq!(space.local_to_global(2), &[3, 5, 6]);
}

#[test]
fn spaces_can_share_bases() {
    let basis = Arc::new(LagrangeBasis::<f64>::try_new(ReferenceCell::Triangle, 2).unwrap());
    let coarse = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(2));
    let fine = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(4));
    let a = FiniteElementSpace::try_new_with_bases(coarse, [Arc::clone(&basis)], Continuity::Continuous).unwrap();
    let b = FiniteElementSpace::try_new_with_bases(fine, [Arc::clone(&basis)], Continuity::Continuous).unwrap();
    assert!(Arc::ptr_eq(a.basis_for_shape(ReferenceCell::Triangle).unwrap(), &basis));
    assert!(Arc::ptr_eq(b.basis_for_shape(ReferenceCell::Triangle).unwrap(), &basis));
}

#[test]
fn bases_of_different_degrees_are_rejected() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(2));
    let bases = [
        Arc::new(LagrangeBasis::<f64>::try_new(ReferenceCell::Triangle, 1).unwrap()),
        Arc::new(LagrangeBasis::<f64>::try_new(ReferenceCell::Quadrilateral, 2).unwrap()),
    ];
    let result = FiniteElementSpace::try_new_with_bases(mesh, bases, Continuity::Continuous);
    assert!(matches!(result, Err(FemError::DimensionMismatch { .. })));
}

#[test]
fn missing_basis_for_shape_is_rejected() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(2));
    let bases = [Arc::new(LagrangeBasis::<f64>::try_new(ReferenceCell::Triangle, 1).unwrap())];
    let result = FiniteElementSpace::try_new_with_bases(mesh, bases, Continuity::Continuous);
    assert!(result.is_err());
}

#[test]
fn excessive_degree_is_unsupported() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(1));
    let result = FiniteElementSpace::try_new(mesh, 11, Continuity::Continuous);
    assert!(matches!(result, Err(FemError::UnsupportedDegree { .. })));
}

#[test]
fn boundary_and_facet_dofs() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(3));
    let space = FiniteElementSpace::try_new(Arc::clone(&mesh), 2, Continuity::Continuous).unwrap();
    // Every boundary facet carries one vertex per segment plus one midpoint
    assert_eq!(space.boundary_dofs().len(), 2 * 4 * 3);
    for dof in space.boundary_dofs() {
        let x = space.dof_point(dof);
        let on_boundary = [x.x, 1.0 - x.x, x.y, 1.0 - x.y].iter().any(|d| d.abs() < 1e-12);
        assert!(on_boundary);
    }

    let facet = mesh.boundary_facets()[0];
    let dofs = space.facet_dofs(facet).unwrap();
    assert_eq!(dofs.len(), 3);
    assert!(dofs.windows(2).all(|w| w[0] < w[1]));
    assert!(matches!(space.facet_dofs(mesh.num_facets()), Err(FemError::Topology { .. })));

    assert_eq!(space.vertex_dofs(0).unwrap().len(), 1);
    assert!(matches!(space.vertex_dofs(mesh.num_vertices()), Err(FemError::Topology { .. })));
}

#[test]
fn interpolation_reproduces_polynomials_of_space_degree() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(2));
    let space = FiniteElementSpace::try_new(mesh, 2, Continuity::Continuous).unwrap();
    let f = |x: &Point2<f64>| 1.0 + x.x * x.y - 2.0 * x.y * x.y;
    let u = space.interpolate(f);
    for cell in 0..space.num_cells() {
        let geometry = space.mesh().cell_geometry(cell);
        for xi in [[0.3, -0.4], [-0.9, 0.8]] {
            let x = geometry.map_reference_coords(&xi);
            assert_scalar_eq!(space.evaluate(&u, cell, &xi).unwrap(), f(&x), comp = abs, tol = 1e-12);
            let gradient = space.evaluate_gradient(&u, cell, &xi).unwrap();
            let expected = Vector2::new(x.y, x.x - 4.0 * x.y);
            assert!((gradient - expected).norm() < 1e-11);
        }
    }
}

#[test]
fn evaluation_checks_its_input() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(1));
    let space = FiniteElementSpace::try_new(mesh, 1, Continuity::Continuous).unwrap();
    let u = DVector::zeros(space.dof_count());
    assert!(matches!(
        space.evaluate(&DVector::zeros(3), 0, &[0.2, 0.2]),
        Err(FemError::DimensionMismatch { .. })
    ));
    assert!(matches!(space.evaluate(&u, 2, &[0.2, 0.2]), Err(FemError::Topology { .. })));
    assert!(matches!(space.evaluate(&u, 0, &[0.2]), Err(FemError::DimensionMismatch { .. })));
}

#[test]
fn spaces_on_embedded_meshes() {
    let vertices = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 0.0), Point3::new(2.0, 1.0, 1.0)];
    let cells = vec![CellConnectivity::interval([0, 1]), CellConnectivity::interval([1, 2])];
    let mesh = Arc::new(Mesh::try_from_vertices_and_connectivity(vertices, cells).unwrap());
    let space = FiniteElementSpace::try_new(mesh, 3, Continuity::Continuous).unwrap();
    assert_eq!(space.dof_count(), 7);
    check_dof_map(&space);
}

#[test]
fn space_on_empty_mesh_has_no_dofs() {
    let mesh = Arc::new(Mesh2d::<f64>::try_from_vertices_and_connectivity(Vec::new(), Vec::new()).unwrap());
    let space = FiniteElementSpace::try_new(mesh, 2, Continuity::Continuous).unwrap();
    assert_eq!(space.dof_count(), 0);
    assert!(space.boundary_dofs().is_empty());
}

#[test]
fn vector_space_dofs_are_interleaved_node_major() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(2));
    let scalar = FiniteElementSpace::try_new(mesh.clone(), 2, Continuity::Continuous).unwrap();
    let vector = FiniteElementSpace::try_new_with_components(mesh, 2, Continuity::Continuous, 3).unwrap();
    assert_eq!(vector.components(), 3);
    assert_eq!(vector.node_count(), scalar.dof_count());
    assert_eq!(vector.dof_count(), 3 * scalar.dof_count());
    assert_eq!(vector.max_local_dofs(), 27);
    for cell in 0..vector.num_cells() {
        let nodes = scalar.local_to_global(cell);
        assert_eq!(vector.cell_nodes(cell), nodes);
        let dofs = vector.local_to_global(cell);
        for (a, &node) in nodes.iter().enumerate() {
            for k in 0..3 {
                assert_eq!(dofs[3 * a + k], 3 * node + k);
                assert_eq!(vector.dof_point(3 * node + k), &scalar.node_points()[node]);
            }
        }
    }

    let expected: Vec<usize> = scalar
        .boundary_dofs()
        .into_iter()
        .flat_map(|node| 3 * node..3 * node + 3)
        .collect();
    assert_eq!(vector.boundary_dofs(), expected);
}

#[test]
fn interpolated_linear_vector_field_is_reproduced() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(3));
    let space = FiniteElementSpace::try_new_with_components(mesh, 2, Continuity::Continuous, 2).unwrap();
    let f = |x: &Point2<f64>| DVector::from_vec(vec![1.0 + 2.0 * x.x - x.y, -3.0 * x.x + 0.5 * x.y]);
    let u = space.interpolate_vector(f).unwrap();
    for cell in 0..space.num_cells() {
        let x = space.mesh().cell_geometry(cell).map_reference_coords(&[0.2, 0.3]);
        let value = space.evaluate_vector(&u, cell, &[0.2, 0.3]).unwrap();
        assert!((value - f(&x)).norm() < 1e-12);
    }

    let wrong = space.interpolate_vector(|_| DVector::zeros(3));
    assert!(matches!(wrong, Err(FemError::DimensionMismatch { .. })));
    assert!(matches!(space.evaluate(&u, 0, &[0.2, 0.3]), Err(FemError::DimensionMismatch { .. })));
    assert!(matches!(
        space.evaluate_gradient(&u, 0, &[0.2, 0.3]),
        Err(FemError::DimensionMismatch { .. })
    ));
}

#[test]
fn scalar_interpolation_fills_every_component() {
    let mesh = Arc::new(create_unit_interval_mesh::<f64>(3));
    let space = FiniteElementSpace::try_new_with_components(mesh, 1, Continuity::Continuous, 2).unwrap();
    let u = space.interpolate(|x| x.x);
    for node in 0..space.node_count() {
        assert_eq!(u[2 * node], space.node_points()[node].x);
        assert_eq!(u[2 * node + 1], space.node_points()[node].x);
    }
}

#[test]
fn space_without_components_is_rejected() {
    let mesh = Arc::new(create_unit_interval_mesh::<f64>(2));
    let result = FiniteElementSpace::try_new_with_components(mesh, 1, Continuity::Continuous, 0);
    assert!(matches!(result, Err(FemError::DimensionMismatch { .. })));
}

#[test]
fn gradients_use_geometry_settings_of_mesh() {
    let vertices = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.5, 1e-13)];
    let cells = vec![CellConnectivity::triangle([0, 1, 2])];
    let flat = Mesh2d::try_from_vertices_and_connectivity(vertices.clone(), cells.clone());
    assert!(matches!(flat, Err(FemError::DegenerateGeometry { .. })));

    let settings = GeometrySettings {
        relative_tolerance: 1e-20,
    };
    let mesh = Mesh2d::try_from_vertices_and_connectivity_with_settings(vertices, cells, &settings).unwrap();
    assert_eq!(mesh.geometry_settings(), &settings);
    assert!(mesh.cell_measure(0).is_ok());
    let basis = LagrangeBasis::try_new(ReferenceCell::Triangle, 1).unwrap();
    assert!(mesh.cell_pushforward(0, &basis, &[0.3, 0.3]).is_ok());
    assert!(mesh.cell_geometry(0).pushforward(&basis, &[0.3, 0.3]).is_err());
    let space = FiniteElementSpace::try_new(Arc::new(mesh), 1, Continuity::Continuous).unwrap();
    let u = space.interpolate(|x: &Point2<f64>| x.x);
    let gradient = space.evaluate_gradient(&u, 0, &[0.3, 0.3]).unwrap();
    assert!((gradient.x - 1.0).abs() < 1e-6);
    assert!(gradient.y.is_finite());
}

proptest! {
    #[test]
    fn interpolated_linear_functions_are_exact_everywhere(
        mesh in galerkin::proptest::unit_square_mesh_strategy(4),
        degree in 1..=3usize,
        (a, b, c) in (-5.0..5.0f64, -5.0..5.0f64, -5.0..5.0f64),
    ) {
        let space = FiniteElementSpace::try_new(Arc::new(mesh), degree, Continuity::Continuous).unwrap();
        let f = |x: &Point2<f64>| a + b * x.x + c * x.y;
        let u = space.interpolate(f);
        for cell in 0..space.num_cells() {
            let geometry = space.mesh().cell_geometry(cell);
            let xi: Vec<f64> = if geometry.shape().is_simplex() { vec![0.2, 0.3] } else { vec![0.2, -0.3] };
            let x = geometry.map_reference_coords(&xi);
            prop_assert!((space.evaluate(&u, cell, &xi).unwrap() - f(&x)).abs() < 1e-11);
        }
    }
}
