//! Solves `-Laplace u = f` on the unit square with a manufactured solution and reports the
//! discretization error for a sequence of meshes.
//!
//! Run with `RUST_LOG=debug` to see the log output of the library.
use eyre::eyre;
use galerkin::assembly::boundary::BoundaryConditions;
use galerkin::assembly::global::SystemAssembler;
use galerkin::assembly::operators::{LaplaceKernel, SourceKernel};
use galerkin::assembly::AssemblySettings;
use galerkin::mesh::procedural::create_unit_square_uniform_tri_mesh_2d;
use galerkin::nalgebra::{DMatrix, Point2, Vector2};
use galerkin::norms::{h1_seminorm_error, l2_error};
use galerkin::space::{Continuity, FiniteElementSpace};
use log::info;
use std::f64::consts::PI;
use std::sync::Arc;

fn u_exact(x: &Point2<f64>) -> f64 {
    (PI * x.x).sin() * (2.0 * PI * x.y).sin() + x.x
}

fn u_exact_gradient(x: &Point2<f64>) -> Vector2<f64> {
    Vector2::new(
        PI * (PI * x.x).cos() * (2.0 * PI * x.y).sin() + 1.0,
        2.0 * PI * (PI * x.x).sin() * (2.0 * PI * x.y).cos(),
    )
}

fn source(x: &Point2<f64>) -> f64 {
    5.0 * PI * PI * (PI * x.x).sin() * (2.0 * PI * x.y).sin()
}

fn main() -> eyre::Result<()> {
    env_logger::init();
    let degree = 2;
    let settings = AssemblySettings {
        parallel: true,
        ..AssemblySettings::default()
    };

    println!("{:>6} {:>8} {:>12} {:>12}", "cells", "dofs", "L2 error", "H1 error");
    for cells_per_dim in [2, 4, 8, 16] {
        let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d(cells_per_dim));
        let space = FiniteElementSpace::try_new(Arc::clone(&mesh), degree, Continuity::Continuous)?;

        // Dirichlet data on the left and right sides, exact fluxes on the top and bottom
        let sides = mesh.boundary_facets_where(|x| x.x < 1e-12 || x.x > 1.0 - 1e-12);
        let top_and_bottom = mesh.boundary_facets_where(|x| x.y < 1e-12 || x.y > 1.0 - 1e-12);
        let bc = BoundaryConditions::new()
            .with_dirichlet_on_facets(sides, u_exact)
            .with_neumann(top_and_bottom, |x: &Point2<f64>, n: &Vector2<f64>| u_exact_gradient(x).dot(n));

        let system = SystemAssembler::new(&space)
            .with_settings(settings)
            .assemble_system(&LaplaceKernel, &SourceKernel::new(source), &bc)?;
        info!("Assembled system with {} non-zeros", system.matrix().nnz());

        // The symmetric elimination keeps the system symmetric positive definite
        let u = DMatrix::from(system.matrix())
            .cholesky()
            .ok_or_else(|| eyre!("Failed to solve linear system"))?
            .solve(system.rhs());

        println!(
            "{:>6} {:>8} {:>12.4e} {:>12.4e}",
            mesh.num_cells(),
            space.dof_count(),
            l2_error(&space, &u, u_exact)?,
            h1_seminorm_error(&space, &u, u_exact_gradient)?
        );
    }

    Ok(())
}
