//! A posteriori error indicators for finite element solutions.
//!
//! Both estimators return one non-negative indicator per cell.
use crate::allocators::DimAllocator;
use crate::assembly::local::LocalAssembler;
use crate::error::FemError;
use crate::space::{FiniteElementSpace, RecoveryWeighting};
use crate::util::real;
use crate::{Real, SmallDim};
use log::debug;
use nalgebra::{DVector, DefaultAllocator, OPoint, OVector};

/// Computes the L2 norm over every cell of the difference between the recovered gradient and
/// the gradient of a scalar finite element function.
pub fn recovery_estimate<T, D>(
    space: &FiniteElementSpace<T, D>,
    coefficients: &DVector<T>,
    weighting: RecoveryWeighting,
) -> Result<DVector<T>, FemError>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    let recovered = space.recover_gradient(coefficients, weighting)?;
    let d = D::dim();
    let assembler = LocalAssembler::new(space);
    let integrand_degree = 2 * space.degree();
    let mut eta = DVector::zeros(space.num_cells());
    for cell in 0..space.num_cells() {
        let nodes = space.cell_nodes(cell);
        let mut squared = T::zero();
        assembler.for_each_cell_point(cell, integrand_degree, |_, scale, values, gradients| {
            let mut e = OVector::<T, D>::zeros();
            for ((&node, &phi), gradient) in nodes.iter().zip(values).zip(gradients.column_iter()) {
                e += recovered.rows(node * d, d) * phi;
                e -= gradient * coefficients[node];
            }
            squared += scale * e.norm_squared();
        })?;
        eta[cell] = squared.sqrt();
    }
    Ok(eta)
}

/// Computes the residual indicator of a scalar finite element solution of the Poisson problem
/// `-laplace(u) = f`.
///
/// Gradients are taken at the reference barycenter of every cell. Every interior facet `E`
/// contributes `|E| ((g_0 - g_1) . n)^2` to both of its cells, and the indicator of a cell `K`
/// is `sqrt(h_K / 4 * sum_E J_E + |K| * integral of f^2 over K)` with `h_K = |K|^(1/d)`.
pub fn residual_estimate<T, D>(
    space: &FiniteElementSpace<T, D>,
    coefficients: &DVector<T>,
    source: Option<&dyn Fn(&OPoint<T, D>) -> T>,
) -> Result<DVector<T>, FemError>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    space.check_scalar("components of space in residual estimate")?;
    let mesh = space.mesh();
    let gradients = (0..space.num_cells())
        .map(|cell| {
            let barycenter: Vec<T> = mesh
                .cell(cell)
                .shape()
                .reference_barycenter()
                .iter()
                .map(|&xi| real(xi))
                .collect();
            space.evaluate_gradient(coefficients, cell, &barycenter)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let assembler = LocalAssembler::new(space);
    let mut jumps = vec![T::zero(); space.num_cells()];
    for facet in 0..mesh.num_facets() {
        let incidences = mesh.facet_incidences(facet);
        if let [(cell, local_facet), (neighbor, _)] = incidences[..] {
            let mut measure = T::zero();
            let mut normal = OVector::<T, D>::zeros();
            assembler.for_each_facet_point(cell, local_facet, 1, |_, n, scale, _| {
                measure += scale;
                normal = n.clone();
            })?;
            let jump = (&gradients[cell] - &gradients[neighbor]).dot(&normal);
            let contribution = measure * jump * jump;
            jumps[cell] += contribution;
            jumps[neighbor] += contribution;
        }
    }

    let d = real::<T>(mesh.topological_dim() as f64);
    let mut eta = DVector::zeros(space.num_cells());
    for cell in 0..space.num_cells() {
        let measure = mesh.cell_measure(cell)?;
        let h = measure.powf(T::one() / d);
        let mut squared = real::<T>(0.25) * h * jumps[cell];
        if let Some(f) = source {
            let mut integral = T::zero();
            assembler.for_each_cell_point(cell, 2 * space.degree() + 2, |x, scale, _, _| {
                let value = f(x);
                integral += scale * value * value;
            })?;
            squared += measure * integral;
        }
        eta[cell] = squared.sqrt();
    }
    debug!("Computed residual indicators for {} cells", space.num_cells());
    Ok(eta)
}
