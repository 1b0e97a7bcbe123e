use galerkin::assembly::global::{CsrAssembler, CsrParAssembler, GlobalSystem, SystemAssembler};
use galerkin::assembly::local::LocalAssembler;
use galerkin::assembly::operators::{
    BasisSample, ConvectionKernel, DiffusionKernel, LaplaceKernel, MassKernel, SourceKernel, VectorSourceKernel,
    WeightedMassKernel,
};
use galerkin::assembly::AssemblySettings;
use galerkin::connectivity::CellConnectivity;
use galerkin::error::FemError;
use galerkin::mesh::procedural::{
    create_unit_box_uniform_tet_mesh_3d, create_unit_square_uniform_quad_mesh_2d,
    create_unit_square_uniform_tri_mesh_2d,
};
use galerkin::mesh::Mesh2d;
use galerkin::space::{Continuity, FiniteElementSpace};
use galerkin::util::symmetry_defect;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, Point2, Vector2, U2};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;

fn reference_triangle_space(degree: usize) -> FiniteElementSpace<f64, U2> {
    let vertices = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
    let mesh = Mesh2d::try_from_vertices_and_connectivity(vertices, vec![CellConnectivity::triangle([0, 1, 2])])
        .unwrap();
    FiniteElementSpace::try_new(Arc::new(mesh), degree, Continuity::Continuous).unwrap()
}

fn unit_square_space(cells_per_dim: usize, degree: usize, triangles: bool) -> FiniteElementSpace<f64, U2> {
    let mesh = if triangles {
        create_unit_square_uniform_tri_mesh_2d(cells_per_dim)
    } else {
        create_unit_square_uniform_quad_mesh_2d(cells_per_dim)
    };
    FiniteElementSpace::try_new(Arc::new(mesh), degree, Continuity::Continuous).unwrap()
}

#[test]
fn reference_triangle_laplace_matrix() {
    let space = reference_triangle_space(1);
    let local = LocalAssembler::new(&space).local_matrix(0, &LaplaceKernel).unwrap();
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
         1.0, -0.5, -0.5,
        -0.5,  0.5,  0.0,
        -0.5,  0.0,  0.5,
    ]);
    assert_matrix_eq!(local, expected, comp = abs, tol = 1e-14);
}

#[test]
fn reference_triangle_mass_matrix_and_load_vector() {
    let space = reference_triangle_space(1);
    let local = LocalAssembler::new(&space);
    let mass = local.local_matrix(0, &MassKernel).unwrap();
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
        2.0, 1.0, 1.0,
        1.0, 2.0, 1.0,
        1.0, 1.0, 2.0,
    ]) / 24.0;
    assert_matrix_eq!(mass, expected, comp = abs, tol = 1e-14);

    let load = local.local_vector(0, &SourceKernel::new(|_: &Point2<f64>| 6.0)).unwrap();
    assert_matrix_eq!(load, DVector::from_element(3, 1.0), comp = abs, tol = 1e-14);
}

#[test]
fn vector_space_local_matrices_are_block_diagonal() {
    let scalar = reference_triangle_space(2);
    let vector = scalar.clone().with_components(2).unwrap();
    let scalar_mass = LocalAssembler::new(&scalar).local_matrix(0, &MassKernel).unwrap();
    let vector_mass = LocalAssembler::new(&vector).local_matrix(0, &MassKernel).unwrap();
    assert_eq!(vector_mass.shape(), (12, 12));
    for a in 0..6 {
        for b in 0..6 {
            assert_eq!(vector_mass[(2 * a, 2 * b)], scalar_mass[(a, b)]);
            assert_eq!(vector_mass[(2 * a + 1, 2 * b + 1)], scalar_mass[(a, b)]);
            assert_eq!(vector_mass[(2 * a, 2 * b + 1)], 0.0);
            assert_eq!(vector_mass[(2 * a + 1, 2 * b)], 0.0);
        }
    }
}

#[test]
fn vector_source_kernel_loads_each_component() {
    let vector = reference_triangle_space(1).with_components(2).unwrap();
    let local = LocalAssembler::new(&vector);
    let kernel = VectorSourceKernel::new(2, |_: &Point2<f64>| DVector::from_vec(vec![6.0, -12.0]));
    let load = local.local_vector(0, &kernel).unwrap();
    let expected = DVector::from_vec(vec![1.0, -2.0, 1.0, -2.0, 1.0, -2.0]);
    assert_matrix_eq!(load, expected, comp = abs, tol = 1e-14);

    // Scalar kernels apply to every component
    let scalar_load = local.local_vector(0, &SourceKernel::new(|_: &Point2<f64>| 6.0)).unwrap();
    assert_matrix_eq!(scalar_load, DVector::from_element(6, 1.0), comp = abs, tol = 1e-14);

    let mismatched = VectorSourceKernel::new(3, |_: &Point2<f64>| DVector::zeros(3));
    assert!(matches!(
        local.local_vector(0, &mismatched),
        Err(FemError::DimensionMismatch { .. })
    ));
}

#[test]
fn local_matrices_are_symmetric_with_zero_row_sums() {
    for triangles in [true, false] {
        for degree in 1..=3 {
            let space = unit_square_space(2, degree, triangles);
            let local = LocalAssembler::new(&space);
            for cell in 0..space.num_cells() {
                let stiffness = local.local_matrix(cell, &LaplaceKernel).unwrap();
                assert_eq!(symmetry_defect(&stiffness), 0.0);
                for row in stiffness.row_iter() {
                    assert_scalar_eq!(row.sum(), 0.0, comp = abs, tol = 1e-12);
                }
            }
        }
    }
}

#[test]
fn global_mass_matrix_integrates_to_domain_measure() {
    for triangles in [true, false] {
        for degree in 1..=3 {
            let space = unit_square_space(3, degree, triangles);
            let mass = SystemAssembler::new(&space).assemble_matrix(&MassKernel).unwrap();
            let total: f64 = mass.values().iter().sum();
            assert_scalar_eq!(total, 1.0, comp = abs, tol = 1e-12);
        }
    }

    let mesh = Arc::new(create_unit_box_uniform_tet_mesh_3d::<f64>(2));
    let space = FiniteElementSpace::try_new(mesh, 2, Continuity::Continuous).unwrap();
    let mass = SystemAssembler::new(&space).assemble_matrix(&MassKernel).unwrap();
    assert_scalar_eq!(mass.values().iter().sum::<f64>(), 1.0, comp = abs, tol = 1e-12);
}

#[test]
fn global_stiffness_matrix_is_symmetric_and_annihilates_constants() {
    let space = unit_square_space(4, 2, true);
    let stiffness = SystemAssembler::new(&space).assemble_matrix(&LaplaceKernel).unwrap();
    assert_eq!(stiffness.nrows(), space.dof_count());
    let dense = DMatrix::from(&stiffness);
    assert!(symmetry_defect(&dense) < 1e-14);
    let ones = DVector::from_element(space.dof_count(), 1.0);
    assert!((&dense * ones).amax() < 1e-12);
}

#[test]
fn pattern_contains_exactly_the_pairs_sharing_a_cell() {
    let space = unit_square_space(2, 1, false);
    let pattern = SystemAssembler::new(&space).assemble_pattern();
    // Corner, edge and center vertices of a 3x3 grid, in some DOF order
    let mut row_lengths: Vec<usize> = (0..pattern.major_dim()).map(|i| pattern.lane(i).len()).collect();
    row_lengths.sort_unstable();
    assert_eq!(row_lengths, vec![4, 4, 4, 4, 6, 6, 6, 6, 9]);
    assert_eq!(pattern, CsrParAssembler::<f64>::default().assemble_pattern(&space));
}

#[test]
fn serial_and_parallel_assembly_are_bitwise_identical() {
    let space = unit_square_space(8, 2, true);
    let diffusion = DiffusionKernel::new(|x: &Point2<f64>| 1.0 + x.x.sin() * x.y);
    let source = SourceKernel::new(|x: &Point2<f64>| (3.0 * x.x).exp() - x.y);

    let serial = SystemAssembler::new(&space);
    let parallel = SystemAssembler::new(&space).with_settings(AssemblySettings {
        parallel: true,
        ..AssemblySettings::default()
    });
    assert_eq!(
        serial.assemble_matrix(&diffusion).unwrap(),
        parallel.assemble_matrix(&diffusion).unwrap()
    );
    assert_eq!(
        serial.assemble_vector(&source).unwrap(),
        parallel.assemble_vector(&source).unwrap()
    );

    // Small chunks exercise the serial scatter across chunk boundaries
    let local = LocalAssembler::new(&space);
    let element_assembler = local.matrix_assembler(&diffusion);
    let reference = CsrAssembler::default().assemble(&element_assembler).unwrap();
    for chunk_size in [1, 7, 100] {
        let chunked = CsrParAssembler::default()
            .with_chunk_size(chunk_size)
            .assemble(&element_assembler)
            .unwrap();
        assert_eq!(chunked, reference);
    }

    let mut vector = DVector::zeros(space.dof_count());
    CsrParAssembler::default()
        .with_chunk_size(5)
        .assemble_vector_into(&mut vector, &local.vector_assembler(&source))
        .unwrap();
    assert_eq!(vector, serial.assemble_vector(&source).unwrap());
}

#[test]
fn reassembly_produces_identical_results() {
    let space = unit_square_space(5, 3, false);
    let assembler = CsrAssembler::default();
    let local = LocalAssembler::new(&space);
    let element_assembler = local.matrix_assembler(&LaplaceKernel);
    let first = assembler.assemble(&element_assembler).unwrap();
    let second = assembler.assemble(&element_assembler).unwrap();
    assert_eq!(first, second);

    // Assembling into an existing matrix accumulates
    let mut doubled = first.clone();
    assembler.assemble_into_csr(&mut doubled, &element_assembler).unwrap();
    for (a, b) in doubled.values().iter().zip(first.values()) {
        assert_scalar_eq!(*a, 2.0 * b, comp = abs, tol = 1e-12);
    }
}

#[test]
fn closure_kernels_match_built_in_kernels() {
    let space = unit_square_space(3, 2, true);
    let assembler = SystemAssembler::new(&space);
    let closure = |_: &Point2<f64>, u: &BasisSample<f64, U2>, v: &BasisSample<f64, U2>| u.gradient.dot(&v.gradient);
    let from_closure = DMatrix::from(&assembler.assemble_matrix(&closure).unwrap());
    let from_kernel = DMatrix::from(&assembler.assemble_matrix(&LaplaceKernel).unwrap());
    assert_matrix_eq!(from_closure, from_kernel, comp = abs, tol = 1e-13);

    let weighted = DMatrix::from(
        &assembler
            .assemble_matrix(&WeightedMassKernel::new(|_: &Point2<f64>| 3.0))
            .unwrap(),
    );
    let mass = DMatrix::from(&assembler.assemble_matrix(&MassKernel).unwrap());
    assert_matrix_eq!(weighted, mass * 3.0, comp = abs, tol = 1e-14);

    let load = |x: &Point2<f64>, v: &BasisSample<f64, U2>| x.x * v.value;
    let from_closure = assembler.assemble_vector(&load).unwrap();
    let from_kernel = assembler
        .assemble_vector(&SourceKernel::new(|x: &Point2<f64>| x.x))
        .unwrap();
    assert_matrix_eq!(from_closure, from_kernel, comp = abs, tol = 1e-14);
}

#[test]
fn convection_matrix_is_not_symmetric() {
    let space = unit_square_space(3, 1, true);
    let convection = ConvectionKernel::new(|_: &Point2<f64>| Vector2::new(1.0, 0.5));
    let matrix = DMatrix::from(&SystemAssembler::new(&space).assemble_matrix(&convection).unwrap());
    assert!(symmetry_defect(&matrix) > 1e-3);
    // Constants are convected to zero
    let ones = DVector::from_element(space.dof_count(), 1.0);
    assert!((&matrix * ones).amax() < 1e-13);
}

#[test]
fn quadrature_degree_is_derived_from_kernel_or_settings() {
    let space = unit_square_space(1, 2, true);
    let local = LocalAssembler::new(&space);
    assert_eq!(local.quadrature_degree(galerkin::connectivity::ReferenceCell::Triangle, 4), 4);
    assert_eq!(local.quadrature_degree(galerkin::connectivity::ReferenceCell::Quadrilateral, 4), 6);

    let fixed = LocalAssembler::new(&space).with_settings(AssemblySettings {
        quadrature_degree: Some(1000),
        ..AssemblySettings::default()
    });
    assert!(matches!(
        fixed.local_matrix(0, &LaplaceKernel),
        Err(FemError::UnsupportedDegree { degree: 1000, .. })
    ));
}

#[test]
fn local_assembly_checks_cell_index() {
    let space = unit_square_space(1, 1, true);
    let local = LocalAssembler::new(&space);
    assert!(matches!(local.local_matrix(2, &MassKernel), Err(FemError::Topology { .. })));
    assert!(matches!(
        local.local_facet_vector(0, 3, |_, _| 1.0),
        Err(FemError::Topology { .. })
    ));
}

#[test]
fn facet_vector_integrates_over_facet_length() {
    let space = reference_triangle_space(1);
    let local = LocalAssembler::new(&space);
    // Local facet 1 is the hypotenuse from (1, 0) to (0, 1)
    let vector = local.local_facet_vector(0, 1, |_, n| n.x + n.y).unwrap();
    let length = 2.0f64.sqrt();
    let expected_flux = 2.0 / 2.0f64.sqrt();
    assert_scalar_eq!(vector.sum(), length * expected_flux, comp = abs, tol = 1e-13);
    assert_scalar_eq!(vector[0], 0.0, comp = abs, tol = 1e-14);

    let matrix = local.local_facet_matrix(0, 1, |_| 1.0).unwrap();
    assert_scalar_eq!(matrix.sum(), length, comp = abs, tol = 1e-13);
}

#[test]
fn global_system_checks_its_input() {
    let non_square = SparsityPattern::try_from_offsets_and_indices(2, 3, vec![0, 1, 2], vec![0, 1]).unwrap();
    assert!(matches!(
        GlobalSystem::<f64>::try_from_pattern(non_square),
        Err(FemError::DimensionMismatch { .. })
    ));

    let diagonal = SparsityPattern::try_from_offsets_and_indices(2, 2, vec![0, 1, 2], vec![0, 1]).unwrap();
    let mut system = GlobalSystem::<f64>::try_from_pattern(diagonal).unwrap();
    assert_eq!(system.dof_count(), 2);
    assert!(matches!(
        system.add_element_matrix(&[0, 1], &DMatrix::identity(3, 3)),
        Err(FemError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        system.add_element_matrix(&[0, 1], &DMatrix::from_element(2, 2, 1.0)),
        Err(FemError::Topology { .. })
    ));
    assert!(matches!(
        system.add_element_vector(&[5], &DVector::from_element(1, 1.0)),
        Err(FemError::Topology { .. })
    ));

    system.clear();
    system.add_element_matrix(&[1], &DMatrix::from_element(1, 1, 2.0)).unwrap();
    system.add_element_vector(&[1, 0], &DVector::from_vec(vec![3.0, 4.0])).unwrap();
    assert_eq!(system.matrix().values(), &[0.0, 2.0]);
    assert_eq!(system.rhs().as_slice(), &[4.0, 3.0]);
    assert_eq!(system.to_coo().nnz(), 2);

    let (matrix, rhs): (CsrMatrix<f64>, DVector<f64>) = system.into_parts();
    assert_eq!(matrix.nrows(), rhs.len());
}

#[test]
fn system_assembly_into_checks_system_size() {
    let small = unit_square_space(1, 1, true);
    let large = unit_square_space(2, 1, true);
    let mut system = SystemAssembler::new(&small).create_system();
    let source = SourceKernel::new(|_: &Point2<f64>| 1.0);
    let result = SystemAssembler::new(&large).assemble_system_into(
        &mut system,
        &LaplaceKernel,
        &source,
        &Default::default(),
    );
    assert!(matches!(result, Err(FemError::DimensionMismatch { .. })));
}

#[test]
fn assembly_settings_deserialize_with_defaults() {
    let settings: AssemblySettings = serde_json::from_str(r#"{ "parallel": true }"#).unwrap();
    assert!(settings.parallel);
    assert_eq!(settings.quadrature_degree, None);
    assert_eq!(settings.constraint_tolerance, AssemblySettings::default().constraint_tolerance);

    let json = serde_json::to_string(&AssemblySettings::default()).unwrap();
    let roundtrip: AssemblySettings = serde_json::from_str(&json).unwrap();
    assert_eq!(roundtrip, AssemblySettings::default());
}
