//! Pointwise integrands of bilinear and linear forms.
//!
//! A kernel is evaluated at every quadrature point for every pair of local basis functions
//! (bilinear) or every local basis function (linear). Plain closures are kernels too.
use crate::allocators::DimAllocator;
use crate::{Real, SmallDim, Symmetry};
use nalgebra::{DVector, DefaultAllocator, OPoint, OVector};

/// The value and physical gradient of a single basis function at a quadrature point.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisSample<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub value: T,
    pub gradient: OVector<T, D>,
}

/// The integrand `k(x, u, v)` of a bilinear form `a(u, v)`.
///
/// The local matrix entry `(i, j)` integrates `k(x, phi_j, phi_i)`, so rows belong to test
/// functions and columns to trial functions.
pub trait BilinearKernel<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn evaluate(&self, x: &OPoint<T, D>, trial: &BasisSample<T, D>, test: &BasisSample<T, D>) -> T;

    /// Symmetric kernels only have their upper triangle evaluated.
    fn symmetry(&self) -> Symmetry {
        Symmetry::NonSymmetric
    }

    /// Polynomial degree of the integrand on an affine cell for bases of the given degree.
    ///
    /// Used to pick the quadrature rule when no degree is configured.
    fn integrand_degree(&self, basis_degree: usize) -> usize {
        2 * basis_degree + 2
    }
}

/// The integrand `l(x, v)` of a linear form.
pub trait LinearKernel<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn evaluate(&self, x: &OPoint<T, D>, test: &BasisSample<T, D>) -> T;

    fn integrand_degree(&self, basis_degree: usize) -> usize {
        basis_degree + 2
    }

    /// The number of components the kernel produces, or `None` if it applies to every
    /// component of a space alike.
    fn num_components(&self) -> Option<usize> {
        None
    }

    /// Writes the integrand for the test function in every component of a vector-valued
    /// space, one entry per component.
    fn evaluate_components(&self, x: &OPoint<T, D>, test: &BasisSample<T, D>, output: &mut [T]) {
        output.fill(self.evaluate(x, test));
    }
}

impl<T, D, F> BilinearKernel<T, D> for F
where
    T: Real,
    D: SmallDim,
    F: Fn(&OPoint<T, D>, &BasisSample<T, D>, &BasisSample<T, D>) -> T,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn evaluate(&self, x: &OPoint<T, D>, trial: &BasisSample<T, D>, test: &BasisSample<T, D>) -> T {
        self(x, trial, test)
    }
}

impl<T, D, F> LinearKernel<T, D> for F
where
    T: Real,
    D: SmallDim,
    F: Fn(&OPoint<T, D>, &BasisSample<T, D>) -> T,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn evaluate(&self, x: &OPoint<T, D>, test: &BasisSample<T, D>) -> T {
        self(x, test)
    }
}

/// The stiffness form `grad u . grad v` of the (negative) Laplace operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct LaplaceKernel;

impl<T, D> BilinearKernel<T, D> for LaplaceKernel
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn evaluate(&self, _x: &OPoint<T, D>, trial: &BasisSample<T, D>, test: &BasisSample<T, D>) -> T {
        trial.gradient.dot(&test.gradient)
    }

    fn symmetry(&self) -> Symmetry {
        Symmetry::Symmetric
    }

    fn integrand_degree(&self, basis_degree: usize) -> usize {
        2 * basis_degree.saturating_sub(1)
    }
}

/// The form `kappa(x) grad u . grad v` with a scalar diffusion coefficient.
#[derive(Debug, Copy, Clone)]
pub struct DiffusionKernel<F> {
    coefficient: F,
}

impl<F> DiffusionKernel<F> {
    pub fn new(coefficient: F) -> Self {
        Self { coefficient }
    }
}

impl<T, D, F> BilinearKernel<T, D> for DiffusionKernel<F>
where
    T: Real,
    D: SmallDim,
    F: Fn(&OPoint<T, D>) -> T,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn evaluate(&self, x: &OPoint<T, D>, trial: &BasisSample<T, D>, test: &BasisSample<T, D>) -> T {
        (self.coefficient)(x) * trial.gradient.dot(&test.gradient)
    }

    fn symmetry(&self) -> Symmetry {
        Symmetry::Symmetric
    }

    fn integrand_degree(&self, basis_degree: usize) -> usize {
        2 * basis_degree
    }
}

/// The mass form `u v`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct MassKernel;

impl<T, D> BilinearKernel<T, D> for MassKernel
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn evaluate(&self, _x: &OPoint<T, D>, trial: &BasisSample<T, D>, test: &BasisSample<T, D>) -> T {
        trial.value * test.value
    }

    fn symmetry(&self) -> Symmetry {
        Symmetry::Symmetric
    }

    fn integrand_degree(&self, basis_degree: usize) -> usize {
        2 * basis_degree
    }
}

/// The reaction form `rho(x) u v`.
#[derive(Debug, Copy, Clone)]
pub struct WeightedMassKernel<F> {
    density: F,
}

impl<F> WeightedMassKernel<F> {
    pub fn new(density: F) -> Self {
        Self { density }
    }
}

impl<T, D, F> BilinearKernel<T, D> for WeightedMassKernel<F>
where
    T: Real,
    D: SmallDim,
    F: Fn(&OPoint<T, D>) -> T,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn evaluate(&self, x: &OPoint<T, D>, trial: &BasisSample<T, D>, test: &BasisSample<T, D>) -> T {
        (self.density)(x) * trial.value * test.value
    }

    fn symmetry(&self) -> Symmetry {
        Symmetry::Symmetric
    }
}

/// The convection form `(b(x) . grad u) v`, which is not symmetric.
#[derive(Debug, Copy, Clone)]
pub struct ConvectionKernel<F> {
    velocity: F,
}

impl<F> ConvectionKernel<F> {
    pub fn new(velocity: F) -> Self {
        Self { velocity }
    }
}

impl<T, D, F> BilinearKernel<T, D> for ConvectionKernel<F>
where
    T: Real,
    D: SmallDim,
    F: Fn(&OPoint<T, D>) -> OVector<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn evaluate(&self, x: &OPoint<T, D>, trial: &BasisSample<T, D>, test: &BasisSample<T, D>) -> T {
        (self.velocity)(x).dot(&trial.gradient) * test.value
    }

    fn integrand_degree(&self, basis_degree: usize) -> usize {
        2 * basis_degree + 1
    }
}

/// The load form `f(x) v`.
#[derive(Debug, Copy, Clone)]
pub struct SourceKernel<F> {
    source: F,
}

impl<F> SourceKernel<F> {
    pub fn new(source: F) -> Self {
        Self { source }
    }
}

impl<T, D, F> LinearKernel<T, D> for SourceKernel<F>
where
    T: Real,
    D: SmallDim,
    F: Fn(&OPoint<T, D>) -> T,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn evaluate(&self, x: &OPoint<T, D>, test: &BasisSample<T, D>) -> T {
        (self.source)(x) * test.value
    }
}

/// The load form `f(x) . v` for a vector-valued source with one entry per space component.
#[derive(Debug, Copy, Clone)]
pub struct VectorSourceKernel<F> {
    components: usize,
    source: F,
}

impl<F> VectorSourceKernel<F> {
    pub fn new(components: usize, source: F) -> Self {
        Self { components, source }
    }
}

impl<T, D, F> LinearKernel<T, D> for VectorSourceKernel<F>
where
    T: Real,
    D: SmallDim,
    F: Fn(&OPoint<T, D>) -> DVector<T>,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// The first component of the source.
    fn evaluate(&self, x: &OPoint<T, D>, test: &BasisSample<T, D>) -> T {
        let f = (self.source)(x);
        f.iter().next().copied().unwrap_or_else(T::zero) * test.value
    }

    fn num_components(&self) -> Option<usize> {
        Some(self.components)
    }

    fn evaluate_components(&self, x: &OPoint<T, D>, test: &BasisSample<T, D>, output: &mut [T]) {
        let f = (self.source)(x);
        for (out, &f_k) in output.iter_mut().zip(f.iter()) {
            *out = f_k * test.value;
        }
    }
}
