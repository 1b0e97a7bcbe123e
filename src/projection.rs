//! L2 projection onto finite element spaces and integrals of basis functions.
use crate::allocators::DimAllocator;
use crate::assembly::global::SystemAssembler;
use crate::assembly::operators::{LinearKernel, MassKernel, SourceKernel};
use crate::error::FemError;
use crate::space::FiniteElementSpace;
use crate::{Real, SmallDim};
use log::debug;
use nalgebra::{DVector, DefaultAllocator, OPoint};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::CscMatrix;

/// Computes the L2 projection of the linear form given by `load` onto the space of the
/// assembler, that is the solution `u` of `M u = b` with the mass matrix `M` and the load vector
/// `b` of the kernel.
///
/// The mass matrix is factored with a sparse Cholesky factorization.
pub fn l2_projection<T, D, K>(assembler: &SystemAssembler<T, D>, load: &K) -> Result<DVector<T>, FemError>
where
    T: Real,
    D: SmallDim,
    K: ?Sized + LinearKernel<T, D> + Sync,
    DefaultAllocator: DimAllocator<T, D>,
    FiniteElementSpace<T, D>: Sync,
{
    let n = assembler.space().dof_count();
    if n == 0 {
        return Ok(DVector::zeros(0));
    }
    let mass = assembler.assemble_matrix(&MassKernel)?;
    let rhs = assembler.assemble_vector(load)?;
    let cholesky = CscCholesky::factor(&CscMatrix::from(&mass)).map_err(|err| FemError::Solver {
        message: format!("Cholesky factorization of mass matrix failed: {}", err),
    })?;
    let solution = cholesky.solve(&rhs);
    debug!("Projected load onto space with {} DOFs", n);
    Ok(solution.column(0).into_owned())
}

/// Projects a scalar function onto the space. Every component of a vector-valued space
/// receives the projection of the same function.
pub fn project_function<T, D, F>(space: &FiniteElementSpace<T, D>, f: F) -> Result<DVector<T>, FemError>
where
    T: Real,
    D: SmallDim,
    F: Fn(&OPoint<T, D>) -> T + Sync,
    DefaultAllocator: DimAllocator<T, D>,
    FiniteElementSpace<T, D>: Sync,
{
    l2_projection(&SystemAssembler::new(space), &SourceKernel::new(f))
}

/// The integral of every basis function over the mesh, one entry per DOF.
pub fn integral_basis<T, D>(space: &FiniteElementSpace<T, D>) -> Result<DVector<T>, FemError>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
    FiniteElementSpace<T, D>: Sync,
{
    SystemAssembler::new(space).assemble_vector(&SourceKernel::new(|_: &OPoint<T, D>| T::one()))
}
