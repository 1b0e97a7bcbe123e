use galerkin::assembly::global::SystemAssembler;
use galerkin::assembly::operators::VectorSourceKernel;
use galerkin::estimate::{recovery_estimate, residual_estimate};
use galerkin::mesh::procedural::{create_unit_square_uniform_quad_mesh_2d, create_unit_square_uniform_tri_mesh_2d};
use galerkin::projection::{integral_basis, l2_projection, project_function};
use galerkin::space::{Continuity, FiniteElementSpace, RecoveryWeighting};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DVector, Point2};
use std::sync::Arc;

#[test]
fn projection_reproduces_polynomials_of_space_degree() {
    for (mesh, degree) in [
        (create_unit_square_uniform_tri_mesh_2d::<f64>(3), 2),
        (create_unit_square_uniform_quad_mesh_2d::<f64>(2), 2),
    ] {
        let space = FiniteElementSpace::try_new(Arc::new(mesh), degree, Continuity::Continuous).unwrap();
        let u = |x: &Point2<f64>| 1.0 - x.x + 2.0 * x.x * x.y - 3.0 * x.y * x.y;
        let projected = project_function(&space, u).unwrap();
        assert_matrix_eq!(projected, space.interpolate(u), comp = abs, tol = 1e-10);
    }
}

#[test]
fn discontinuous_projection_of_vector_field() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(2));
    let space = FiniteElementSpace::try_new_with_components(mesh, 1, Continuity::Discontinuous, 2).unwrap();
    let f = |x: &Point2<f64>| DVector::from_vec(vec![x.x + x.y, 2.0 - x.y]);
    let kernel = VectorSourceKernel::new(2, f);
    let projected = l2_projection(&SystemAssembler::new(&space), &kernel).unwrap();
    assert_matrix_eq!(projected, space.interpolate_vector(f).unwrap(), comp = abs, tol = 1e-10);
}

#[test]
fn basis_integrals_sum_to_domain_measure() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(4));
    let space = FiniteElementSpace::try_new(mesh.clone(), 1, Continuity::Continuous).unwrap();
    let integrals = integral_basis(&space).unwrap();
    assert_scalar_eq!(integrals.sum(), 1.0, comp = abs, tol = 1e-13);

    // Linear basis functions on triangles integrate to a third of the measure of each cell
    let mut expected = DVector::zeros(space.dof_count());
    for cell in 0..space.num_cells() {
        let measure = mesh.cell_measure(cell).unwrap();
        for &dof in space.local_to_global(cell) {
            expected[dof] += measure / 3.0;
        }
    }
    assert_matrix_eq!(integrals, expected, comp = abs, tol = 1e-14);
}

#[test]
fn estimators_vanish_for_linear_solutions() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(3));
    let space = FiniteElementSpace::try_new(mesh, 1, Continuity::Continuous).unwrap();
    let u = space.interpolate(|x: &Point2<f64>| 3.0 * x.x - x.y);

    let recovery = recovery_estimate(&space, &u, RecoveryWeighting::Area).unwrap();
    assert_eq!(recovery.len(), space.num_cells());
    assert!(recovery.amax() < 1e-12);

    let residual = residual_estimate(&space, &u, None).unwrap();
    assert!(residual.amax() < 1e-12);
}

#[test]
fn estimators_detect_gradient_jumps() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(4));
    let space = FiniteElementSpace::try_new(mesh, 1, Continuity::Continuous).unwrap();
    let u = space.interpolate(|x: &Point2<f64>| x.x * x.x + x.y * x.y);

    let recovery = recovery_estimate(&space, &u, RecoveryWeighting::Simple).unwrap();
    assert!(recovery.iter().all(|&eta| eta >= 0.0));
    assert!(recovery.amax() > 1e-3);

    let residual = residual_estimate(&space, &u, None).unwrap();
    assert!(residual.iter().all(|&eta| eta >= 0.0));
    assert!(residual.amax() > 1e-3);
}

#[test]
fn residual_estimate_of_zero_solution_is_source_term() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(2));
    let space = FiniteElementSpace::try_new(mesh.clone(), 1, Continuity::Continuous).unwrap();
    let u = DVector::zeros(space.dof_count());
    let one: &dyn Fn(&Point2<f64>) -> f64 = &|_| 1.0;
    let residual = residual_estimate(&space, &u, Some(one)).unwrap();
    // sqrt(|K| * integral of 1 over K) = |K|
    for cell in 0..space.num_cells() {
        assert_scalar_eq!(residual[cell], mesh.cell_measure(cell).unwrap(), comp = abs, tol = 1e-14);
    }
}
