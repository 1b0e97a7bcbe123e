//! Element-level assembly.
//!
//! [`LocalAssembler`] integrates kernels over single cells and single facets of a finite element
//! space. The `Element*Assembler` traits describe element-level contributions independently of
//! how they are computed, and are what the global assemblers consume.
use crate::allocators::DimAllocator;
use crate::assembly::buffers::TabulationCache;
use crate::assembly::operators::{BasisSample, BilinearKernel, LinearKernel};
use crate::assembly::AssemblySettings;
use crate::connectivity::ReferenceCell;
use crate::element::{
    check_jacobian, jacobian_from_shape_gradients, map_with_shape_values, outward_unit_normal, physical_gradients,
};
use crate::error::FemError;
use crate::space::FiniteElementSpace;
use crate::util::{clone_upper_to_lower, real};
use crate::{Real, SmallDim, Symmetry};
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut, DefaultAllocator, Dyn, OMatrix, OPoint, OVector, Scalar};
use std::cell::RefCell;
use std::iter::repeat;
use thread_local::ThreadLocal;

pub trait ElementConnectivityAssembler {
    fn num_elements(&self) -> usize;

    /// The number of global nodes (degrees of freedom).
    fn num_nodes(&self) -> usize;

    fn element_node_count(&self, element_index: usize) -> usize;

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize);
}

pub trait ElementMatrixAssembler<T: Scalar>: ElementConnectivityAssembler {
    fn assemble_element_matrix_into(&self, element_index: usize, output: DMatrixViewMut<T>) -> Result<(), FemError>;
}

pub trait ElementVectorAssembler<T: Scalar>: ElementConnectivityAssembler {
    fn assemble_element_vector_into(&self, element_index: usize, output: DVectorViewMut<T>) -> Result<(), FemError>;
}

impl<T, D> ElementConnectivityAssembler for FiniteElementSpace<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn num_elements(&self) -> usize {
        self.num_cells()
    }

    fn num_nodes(&self) -> usize {
        self.dof_count()
    }

    fn element_node_count(&self, element_index: usize) -> usize {
        self.num_local_dofs(element_index)
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(self.local_to_global(element_index));
    }
}

/// Integrates kernels over the cells and facets of a finite element space.
///
/// Quadrature rules and tabulated basis values are cached per thread, so a single assembler can
/// be shared between the workers of a parallel assembly.
#[derive(Debug)]
pub struct LocalAssembler<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    space: &'a FiniteElementSpace<T, D>,
    settings: AssemblySettings,
    cache: ThreadLocal<RefCell<TabulationCache<T>>>,
}

impl<'a, T, D> LocalAssembler<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn new(space: &'a FiniteElementSpace<T, D>) -> Self {
        Self {
            space,
            settings: AssemblySettings::default(),
            cache: ThreadLocal::new(),
        }
    }

    pub fn with_settings(mut self, settings: AssemblySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn space(&self) -> &'a FiniteElementSpace<T, D> {
        self.space
    }

    pub fn settings(&self) -> &AssemblySettings {
        &self.settings
    }

    /// The strength of the quadrature rule used for an integrand of the given degree.
    ///
    /// Tensor product cells get two extra degrees, since their geometry map is multilinear
    /// rather than affine.
    pub fn quadrature_degree(&self, shape: ReferenceCell, integrand_degree: usize) -> usize {
        self.settings
            .quadrature_degree
            .unwrap_or_else(|| if shape.is_simplex() { integrand_degree } else { integrand_degree + 2 })
    }

    fn tolerance(&self) -> T {
        real(self.settings.geometry.relative_tolerance)
    }

    /// Visits every quadrature point of a cell with the physical point, the quadrature weight
    /// scaled by the volume factor, and the values and physical gradients of the basis.
    pub(crate) fn for_each_cell_point<F>(
        &self,
        cell_index: usize,
        integrand_degree: usize,
        mut visit: F,
    ) -> Result<(), FemError>
    where
        F: FnMut(&OPoint<T, D>, T, &[T], &OMatrix<T, D, Dyn>),
    {
        self.space.check_cell_index(cell_index)?;
        let basis = self.space.basis_for_cell(cell_index);
        let degree = self.quadrature_degree(basis.shape(), integrand_degree);
        let tabulation = self
            .cache
            .get_or_default()
            .borrow_mut()
            .cell_tabulation(basis, degree)?;
        let geometry = self.space.mesh().cell_geometry(cell_index);
        let tolerance = self.tolerance();

        let mut gradients = OMatrix::<T, D, Dyn>::zeros(basis.local_dofs().len());
        for point in tabulation.points() {
            let x = map_with_shape_values(geometry.vertices(), &point.shape_values);
            let jacobian = jacobian_from_shape_gradients(geometry.vertices(), &point.shape_gradients);
            let determinant = physical_gradients(&jacobian, &point.basis_gradients, &mut gradients, tolerance)
                .map_err(|err| err.with_cell(cell_index))?;
            visit(&x, point.weight * determinant, &point.basis_values, &gradients);
        }
        Ok(())
    }

    /// Visits every quadrature point of a local facet of a cell with the physical point, the
    /// outward unit normal, the quadrature weight scaled by the surface factor, and the values
    /// of the cell basis.
    pub(crate) fn for_each_facet_point<F>(
        &self,
        cell_index: usize,
        local_facet: usize,
        integrand_degree: usize,
        mut visit: F,
    ) -> Result<(), FemError>
    where
        F: FnMut(&OPoint<T, D>, &OVector<T, D>, T, &[T]),
    {
        self.space.check_cell_index(cell_index)?;
        let basis = self.space.basis_for_cell(cell_index);
        let shape = basis.shape();
        if local_facet >= shape.num_facets() {
            return Err(FemError::topology(format!(
                "local facet {} is out of bounds for {:?} cell {}",
                local_facet, shape, cell_index
            )));
        }
        let degree = self.quadrature_degree(shape, integrand_degree);
        let tabulation = self
            .cache
            .get_or_default()
            .borrow_mut()
            .facet_tabulation(basis, local_facet, degree)?;
        let geometry = self.space.mesh().cell_geometry(cell_index);
        let facet_vertices: Vec<_> = shape.facets()[local_facet]
            .iter()
            .map(|&v| geometry.vertices()[v].clone())
            .collect();
        let tolerance = self.tolerance();

        let mut outward = vec![T::zero(); shape.reference_dim()];
        for point in tabulation.points() {
            let x = map_with_shape_values(geometry.vertices(), &point.shape_values);
            let cell_jacobian = jacobian_from_shape_gradients(geometry.vertices(), &point.shape_gradients);
            let facet_jacobian = jacobian_from_shape_gradients(&facet_vertices, &point.facet_shape_gradients);
            let scale = check_jacobian(&facet_jacobian, tolerance).map_err(|err| err.with_cell(cell_index))?;
            for ((r, &xi), &center) in outward
                .iter_mut()
                .zip(&point.reference_coords)
                .zip(tabulation.reference_barycenter())
            {
                *r = xi - center;
            }
            let normal = outward_unit_normal(&cell_jacobian, &facet_jacobian, &outward).ok_or(
                FemError::DegenerateGeometry {
                    cell: Some(cell_index),
                    determinant: 0.0,
                },
            )?;
            visit(&x, &normal, point.weight * scale, &point.basis_values);
        }
        Ok(())
    }

    fn check_local_size(&self, cell_index: usize, rows: usize, cols: usize) -> Result<usize, FemError> {
        self.space.check_cell_index(cell_index)?;
        let n = self.space.num_local_dofs(cell_index);
        for actual in [rows, cols] {
            if actual != n {
                return Err(FemError::DimensionMismatch {
                    context: "local element output",
                    expected: n,
                    actual,
                });
            }
        }
        Ok(n)
    }

    /// Computes the element matrix `A_ij = integral of k(x, phi_j, phi_i)` over a cell into
    /// the provided output, which must be square with one row per local DOF.
    pub fn assemble_element_matrix_into<K>(
        &self,
        cell_index: usize,
        kernel: &K,
        mut output: DMatrixViewMut<T>,
    ) -> Result<(), FemError>
    where
        K: ?Sized + BilinearKernel<T, D>,
    {
        let n = self.check_local_size(cell_index, output.nrows(), output.ncols())?;
        output.fill(T::zero());
        let symmetric = matches!(kernel.symmetry(), Symmetry::Symmetric);
        let integrand_degree = kernel.integrand_degree(self.space.degree());
        let m = self.space.components();
        let nodes = n / m;

        let mut samples: Vec<BasisSample<T, D>> = Vec::with_capacity(nodes);
        self.for_each_cell_point(cell_index, integrand_degree, |x, scale, values, gradients| {
            samples.clear();
            samples.extend(
                values
                    .iter()
                    .zip(gradients.column_iter())
                    .map(|(&value, gradient)| BasisSample {
                        value,
                        gradient: gradient.into_owned(),
                    }),
            );
            for a in 0..nodes {
                let first_column = if symmetric { a } else { 0 };
                for b in first_column..nodes {
                    let value = scale * kernel.evaluate(x, &samples[b], &samples[a]);
                    for k in 0..m {
                        output[(a * m + k, b * m + k)] += value;
                    }
                }
            }
        })?;

        if symmetric {
            clone_upper_to_lower(&mut output);
        }
        Ok(())
    }

    pub fn local_matrix<K>(&self, cell_index: usize, kernel: &K) -> Result<DMatrix<T>, FemError>
    where
        K: ?Sized + BilinearKernel<T, D>,
    {
        self.space.check_cell_index(cell_index)?;
        let n = self.space.num_local_dofs(cell_index);
        let mut matrix = DMatrix::zeros(n, n);
        self.assemble_element_matrix_into(cell_index, kernel, DMatrixViewMut::from(&mut matrix))?;
        Ok(matrix)
    }

    /// Computes the element vector `b_i = integral of l(x, phi_i)` over a cell.
    pub fn assemble_element_vector_into<K>(
        &self,
        cell_index: usize,
        kernel: &K,
        mut output: DVectorViewMut<T>,
    ) -> Result<(), FemError>
    where
        K: ?Sized + LinearKernel<T, D>,
    {
        let n = self.check_local_size(cell_index, output.nrows(), output.nrows())?;
        let m = self.space.components();
        if let Some(components) = kernel.num_components() {
            if components != m {
                return Err(FemError::DimensionMismatch {
                    context: "linear kernel components",
                    expected: m,
                    actual: components,
                });
            }
        }
        output.fill(T::zero());
        let integrand_degree = kernel.integrand_degree(self.space.degree());
        let mut integrand = vec![T::zero(); m];
        self.for_each_cell_point(cell_index, integrand_degree, |x, scale, values, gradients| {
            for a in 0..n / m {
                let sample = BasisSample {
                    value: values[a],
                    gradient: gradients.column(a).into_owned(),
                };
                integrand.fill(T::zero());
                kernel.evaluate_components(x, &sample, &mut integrand);
                for (k, &value) in integrand.iter().enumerate() {
                    output[a * m + k] += scale * value;
                }
            }
        })
    }

    pub fn local_vector<K>(&self, cell_index: usize, kernel: &K) -> Result<DVector<T>, FemError>
    where
        K: ?Sized + LinearKernel<T, D>,
    {
        self.space.check_cell_index(cell_index)?;
        let mut vector = DVector::zeros(self.space.num_local_dofs(cell_index));
        self.assemble_element_vector_into(cell_index, kernel, DVectorViewMut::from(&mut vector))?;
        Ok(vector)
    }

    /// Integrates `g(x, n) phi_i` over a local facet of a cell, where `n` is the outward unit
    /// normal. The result has one entry per local DOF of the cell, and every component of a
    /// vector-valued space receives the same flux.
    pub fn local_facet_vector<F>(&self, cell_index: usize, local_facet: usize, flux: F) -> Result<DVector<T>, FemError>
    where
        F: Fn(&OPoint<T, D>, &OVector<T, D>) -> T,
    {
        self.space.check_cell_index(cell_index)?;
        let m = self.space.components();
        let mut vector = DVector::zeros(self.space.num_local_dofs(cell_index));
        let integrand_degree = 2 * self.space.degree() + 2;
        self.for_each_facet_point(cell_index, local_facet, integrand_degree, |x, normal, scale, values| {
            let g = flux(x, normal);
            for (b, &phi) in vector.iter_mut().zip(values.iter().flat_map(|phi| repeat(phi).take(m))) {
                *b += scale * g * phi;
            }
        })?;
        Ok(vector)
    }

    /// Integrates `kappa(x) phi_j phi_i` over a local facet of a cell.
    pub fn local_facet_matrix<F>(
        &self,
        cell_index: usize,
        local_facet: usize,
        coefficient: F,
    ) -> Result<DMatrix<T>, FemError>
    where
        F: Fn(&OPoint<T, D>) -> T,
    {
        self.space.check_cell_index(cell_index)?;
        let n = self.space.num_local_dofs(cell_index);
        let m = self.space.components();
        let mut matrix = DMatrix::zeros(n, n);
        let integrand_degree = 2 * self.space.degree() + 2;
        self.for_each_facet_point(cell_index, local_facet, integrand_degree, |x, _, scale, values| {
            let kappa = coefficient(x);
            for a in 0..n / m {
                for b in a..n / m {
                    let value = scale * kappa * values[a] * values[b];
                    for k in 0..m {
                        matrix[(a * m + k, b * m + k)] += value;
                    }
                }
            }
        })?;
        clone_upper_to_lower(&mut matrix);
        Ok(matrix)
    }

    /// Adapts a bilinear kernel into an [`ElementMatrixAssembler`] over the cells of the space.
    pub fn matrix_assembler<'b, K>(&'b self, kernel: &'b K) -> KernelMatrixAssembler<'b, 'a, T, D, K>
    where
        K: ?Sized + BilinearKernel<T, D>,
    {
        KernelMatrixAssembler { local: self, kernel }
    }

    /// Adapts a linear kernel into an [`ElementVectorAssembler`] over the cells of the space.
    pub fn vector_assembler<'b, K>(&'b self, kernel: &'b K) -> KernelVectorAssembler<'b, 'a, T, D, K>
    where
        K: ?Sized + LinearKernel<T, D>,
    {
        KernelVectorAssembler { local: self, kernel }
    }
}

/// Element matrices of a bilinear kernel.
pub struct KernelMatrixAssembler<'b, 'a, T, D, K: ?Sized>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    local: &'b LocalAssembler<'a, T, D>,
    kernel: &'b K,
}

/// Element vectors of a linear kernel.
pub struct KernelVectorAssembler<'b, 'a, T, D, K: ?Sized>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    local: &'b LocalAssembler<'a, T, D>,
    kernel: &'b K,
}

macro_rules! delegate_connectivity_to_space {
    ($assembler:ident) => {
        impl<'b, 'a, T, D, K: ?Sized> ElementConnectivityAssembler for $assembler<'b, 'a, T, D, K>
        where
            T: Real,
            D: SmallDim,
            DefaultAllocator: DimAllocator<T, D>,
        {
            fn num_elements(&self) -> usize {
                self.local.space.num_elements()
            }

            fn num_nodes(&self) -> usize {
                self.local.space.num_nodes()
            }

            fn element_node_count(&self, element_index: usize) -> usize {
                self.local.space.element_node_count(element_index)
            }

            fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
                self.local
                    .space
                    .populate_element_nodes(output, element_index)
            }
        }
    };
}

delegate_connectivity_to_space!(KernelMatrixAssembler);
delegate_connectivity_to_space!(KernelVectorAssembler);

impl<'b, 'a, T, D, K> ElementMatrixAssembler<T> for KernelMatrixAssembler<'b, 'a, T, D, K>
where
    T: Real,
    D: SmallDim,
    K: ?Sized + BilinearKernel<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn assemble_element_matrix_into(&self, element_index: usize, output: DMatrixViewMut<T>) -> Result<(), FemError> {
        self.local
            .assemble_element_matrix_into(element_index, self.kernel, output)
    }
}

impl<'b, 'a, T, D, K> ElementVectorAssembler<T> for KernelVectorAssembler<'b, 'a, T, D, K>
where
    T: Real,
    D: SmallDim,
    K: ?Sized + LinearKernel<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn assemble_element_vector_into(&self, element_index: usize, output: DVectorViewMut<T>) -> Result<(), FemError> {
        self.local
            .assemble_element_vector_into(element_index, self.kernel, output)
    }
}
