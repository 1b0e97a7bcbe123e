//! Errors of finite element functions measured against analytic functions.
use crate::allocators::DimAllocator;
use crate::assembly::local::LocalAssembler;
use crate::error::FemError;
use crate::space::FiniteElementSpace;
use crate::{Real, SmallDim};
use nalgebra::{DVector, DefaultAllocator, OPoint, OVector};
use numeric_literals::replace_float_literals;

fn check_coefficients<T, D>(space: &FiniteElementSpace<T, D>, coefficients: &DVector<T>) -> Result<(), FemError>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    if coefficients.len() == space.dof_count() {
        Ok(())
    } else {
        Err(FemError::DimensionMismatch {
            context: "coefficient vector",
            expected: space.dof_count(),
            actual: coefficients.len(),
        })
    }
}

/// Quadrature is chosen exact for polynomials four degrees above the square of the discrete
/// function, which leaves room for smooth exact solutions.
fn error_integrand_degree(basis_degree: usize) -> usize {
    2 * basis_degree + 4
}

/// Computes `||u_h - u||_{L2}` for the finite element function `u_h` with the given
/// coefficients and an exact solution `u`. The space must be scalar.
pub fn l2_error<T, D, F>(space: &FiniteElementSpace<T, D>, coefficients: &DVector<T>, exact: F) -> Result<T, FemError>
where
    T: Real,
    D: SmallDim,
    F: Fn(&OPoint<T, D>) -> T,
    DefaultAllocator: DimAllocator<T, D>,
{
    space.check_scalar("components of space in L2 error")?;
    l2_vector_error(space, coefficients, |x| DVector::from_element(1, exact(x)))
}

/// Computes the L2 error of a vector-valued finite element function, where the exact solution
/// has one entry per component of the space.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn l2_vector_error<T, D, F>(
    space: &FiniteElementSpace<T, D>,
    coefficients: &DVector<T>,
    exact: F,
) -> Result<T, FemError>
where
    T: Real,
    D: SmallDim,
    F: Fn(&OPoint<T, D>) -> DVector<T>,
    DefaultAllocator: DimAllocator<T, D>,
{
    check_coefficients(space, coefficients)?;
    let m = space.components();
    let assembler = LocalAssembler::new(space);
    let integrand_degree = error_integrand_degree(space.degree());
    let mut squared = 0.0;
    let mut mismatch = None;
    for cell in 0..space.num_cells() {
        let nodes = space.cell_nodes(cell);
        assembler.for_each_cell_point(cell, integrand_degree, |x, scale, values, _| {
            let mut e = -exact(x);
            if e.len() != m {
                mismatch = Some(e.len());
                return;
            }
            for (&node, &phi) in nodes.iter().zip(values) {
                e += coefficients.rows(node * m, m) * phi;
            }
            squared += scale * e.norm_squared();
        })?;
        if let Some(actual) = mismatch {
            return Err(FemError::DimensionMismatch {
                context: "exact solution components",
                expected: m,
                actual,
            });
        }
    }
    Ok(squared.sqrt())
}

/// Computes `||grad u_h - grad u||_{L2}`, given the gradient of the exact solution.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn h1_seminorm_error<T, D, F>(
    space: &FiniteElementSpace<T, D>,
    coefficients: &DVector<T>,
    exact_gradient: F,
) -> Result<T, FemError>
where
    T: Real,
    D: SmallDim,
    F: Fn(&OPoint<T, D>) -> OVector<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    space.check_scalar("components of space in H1 seminorm error")?;
    check_coefficients(space, coefficients)?;
    let assembler = LocalAssembler::new(space);
    let integrand_degree = error_integrand_degree(space.degree());
    let mut squared = 0.0;
    for cell in 0..space.num_cells() {
        let global = space.local_to_global(cell);
        assembler.for_each_cell_point(cell, integrand_degree, |x, scale, _, gradients| {
            let mut e = -exact_gradient(x);
            for (&i, gradient) in global.iter().zip(gradients.column_iter()) {
                e += gradient * coefficients[i];
            }
            squared += scale * e.norm_squared();
        })?;
    }
    Ok(squared.sqrt())
}
