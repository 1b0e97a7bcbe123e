//! Global assembly of element contributions into sparse matrices and dense vectors.
//!
//! Element matrices are always added to the global matrix one element at a time, in element
//! order. The parallel assemblers only compute element contributions concurrently, so serial
//! and parallel assembly produce bitwise identical results.
use crate::allocators::DimAllocator;
use crate::assembly::boundary::{apply_dirichlet_constraints, BoundaryConditions};
use crate::assembly::local::{
    ElementConnectivityAssembler, ElementMatrixAssembler, ElementVectorAssembler, LocalAssembler,
};
use crate::assembly::operators::{BilinearKernel, LinearKernel};
use crate::assembly::AssemblySettings;
use crate::error::FemError;
use crate::space::FiniteElementSpace;
use crate::util::real;
use crate::{Real, SmallDim};
use log::{debug, trace};
use nalgebra::base::storage::Storage;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut, DefaultAllocator, Dyn, Matrix, Scalar, U1};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::ops::Range;

/// An assembler for CSR matrices.
#[derive(Debug, Clone)]
pub struct CsrAssembler<T: Scalar> {
    // Buffers that prevent unnecessary allocations when assembling several matrices with the
    // same assembler
    workspace: RefCell<CsrAssemblerWorkspace<T>>,
}

impl<T: Scalar> Default for CsrAssembler<T> {
    fn default() -> Self {
        Self {
            workspace: RefCell::new(CsrAssemblerWorkspace::default()),
        }
    }
}

#[derive(Debug, Clone)]
struct CsrAssemblerWorkspace<T: Scalar> {
    connectivity_permutation: Vec<usize>,
    element_global_nodes: Vec<usize>,
    element_matrix: DMatrix<T>,
    element_vector: DVector<T>,
}

impl<T: Scalar> Default for CsrAssemblerWorkspace<T> {
    fn default() -> Self {
        Self {
            connectivity_permutation: Vec::new(),
            element_global_nodes: Vec::new(),
            element_matrix: DMatrix::from_row_slice(0, 0, &[]),
            element_vector: DVector::from_vec(Vec::new()),
        }
    }
}

/// Builds a square pattern from sorted coordinates, skipping duplicates.
fn pattern_from_sorted_coordinates(num_rows: usize, coordinates: impl IntoIterator<Item = (usize, usize)>) -> SparsityPattern {
    let mut row_offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::new();
    row_offsets.push(0);

    let mut current_row = 0;
    let mut prev_col = None;
    for (i, j) in coordinates {
        assert!(i < num_rows, "Coordinates must be in bounds");
        while i > current_row {
            row_offsets.push(column_indices.len());
            current_row += 1;
            prev_col = None;
        }
        // Only add column if it is not a duplicate
        if Some(j) != prev_col {
            column_indices.push(j);
            prev_col = Some(j);
        }
    }

    // Fill out offsets for remaining empty rows
    while row_offsets.len() < num_rows + 1 {
        row_offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, row_offsets, column_indices)
        .expect("Sorted, deduplicated coordinates always form a valid pattern")
}

fn check_global_size(context: &'static str, expected: usize, actual: usize) -> Result<(), FemError> {
    if expected == actual {
        Ok(())
    } else {
        Err(FemError::DimensionMismatch {
            context,
            expected,
            actual,
        })
    }
}

impl<T: Scalar> CsrAssembler<T> {
    pub fn assemble_pattern<A>(&self, element_assembler: &A) -> SparsityPattern
    where
        A: ?Sized + ElementConnectivityAssembler,
    {
        // Collecting into a BTreeSet stores each matrix entry exactly once, which keeps memory
        // usage low when many elements share nodes
        let mut matrix_entries = BTreeSet::new();
        let mut element_global_nodes = Vec::new();
        for i in 0..element_assembler.num_elements() {
            let element_node_count = element_assembler.element_node_count(i);
            element_global_nodes.resize(element_node_count, usize::MAX);
            element_assembler.populate_element_nodes(&mut element_global_nodes, i);

            for &node_i in &element_global_nodes {
                for &node_j in &element_global_nodes {
                    matrix_entries.insert((node_i, node_j));
                }
            }
        }

        pattern_from_sorted_coordinates(element_assembler.num_nodes(), matrix_entries)
    }
}

impl<T: Real> CsrAssembler<T> {
    pub fn assemble<A>(&self, element_assembler: &A) -> Result<CsrMatrix<T>, FemError>
    where
        A: ?Sized + ElementMatrixAssembler<T>,
    {
        let pattern = self.assemble_pattern(element_assembler);
        let mut matrix = zero_csr(pattern);
        self.assemble_into_csr(&mut matrix, element_assembler)?;
        Ok(matrix)
    }

    /// Adds the element matrices of all elements to the given matrix, whose sparsity pattern
    /// must contain every element block.
    pub fn assemble_into_csr<A>(&self, csr: &mut CsrMatrix<T>, element_assembler: &A) -> Result<(), FemError>
    where
        A: ?Sized + ElementMatrixAssembler<T>,
    {
        check_global_size("global matrix rows", element_assembler.num_nodes(), csr.nrows())?;
        // Reuse previously allocated buffers
        let ws = &mut *self.workspace.borrow_mut();

        for i in 0..element_assembler.num_elements() {
            let element_node_count = element_assembler.element_node_count(i);
            ws.element_global_nodes.resize(element_node_count, 0);
            ws.element_matrix
                .resize_mut(element_node_count, element_node_count, T::zero());
            ws.element_matrix.fill(T::zero());

            let matrix_slice = DMatrixViewMut::from(&mut ws.element_matrix);
            element_assembler.assemble_element_matrix_into(i, matrix_slice)?;
            element_assembler.populate_element_nodes(&mut ws.element_global_nodes, i);

            scatter_element_matrix(
                csr,
                &ws.element_global_nodes,
                &mut ws.connectivity_permutation,
                &ws.element_matrix,
            )?;
        }

        Ok(())
    }

    /// Adds the element vectors of all elements to the given vector.
    pub fn assemble_vector_into<A>(&self, vector: &mut DVector<T>, element_assembler: &A) -> Result<(), FemError>
    where
        A: ?Sized + ElementVectorAssembler<T>,
    {
        check_global_size("global vector", element_assembler.num_nodes(), vector.len())?;
        let ws = &mut *self.workspace.borrow_mut();

        for i in 0..element_assembler.num_elements() {
            let element_node_count = element_assembler.element_node_count(i);
            ws.element_global_nodes.resize(element_node_count, 0);
            ws.element_vector.resize_vertically_mut(element_node_count, T::zero());
            ws.element_vector.fill(T::zero());

            element_assembler.assemble_element_vector_into(i, DVectorViewMut::from(&mut ws.element_vector))?;
            element_assembler.populate_element_nodes(&mut ws.element_global_nodes, i);
            for (&global, &value) in ws.element_global_nodes.iter().zip(ws.element_vector.iter()) {
                vector[global] += value;
            }
        }

        Ok(())
    }
}

/// A parallel assembler for CSR matrices.
///
/// Elements are processed in chunks. Within a chunk, element contributions are computed in
/// parallel; they are then added to the global matrix serially in element order.
#[derive(Debug)]
pub struct CsrParAssembler<T: Scalar + Send> {
    chunk_size: usize,
    workspace: RefCell<CsrAssemblerWorkspace<T>>,
}

impl<T: Scalar + Send> Default for CsrParAssembler<T> {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            workspace: Default::default(),
        }
    }
}

impl<T: Scalar + Send> CsrParAssembler<T> {
    /// The number of elements whose contributions are held in memory at the same time.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn chunks(&self, num_elements: usize) -> impl Iterator<Item = Range<usize>> {
        let chunk_size = self.chunk_size;
        (0..num_elements)
            .step_by(chunk_size)
            .map(move |start| start..usize::min(start + chunk_size, num_elements))
    }

    pub fn assemble_pattern<A>(&self, element_assembler: &A) -> SparsityPattern
    where
        A: ?Sized + ElementConnectivityAssembler + Sync,
    {
        // Count number of (including duplicate) coordinates
        let num_total_coordinates = (0..element_assembler.num_elements())
            .into_par_iter()
            .with_min_len(50)
            .map(|element_idx| {
                let num_entries = element_assembler.element_node_count(element_idx);
                num_entries * num_entries
            })
            .sum();

        let mut coordinates = Vec::with_capacity(num_total_coordinates);
        let mut index_workspace = Vec::new();
        for element_idx in 0..element_assembler.num_elements() {
            let node_count = element_assembler.element_node_count(element_idx);
            index_workspace.resize(node_count, 0);
            element_assembler.populate_element_nodes(&mut index_workspace, element_idx);

            for &node_i in &index_workspace {
                for &node_j in &index_workspace {
                    coordinates.push((node_i, node_j));
                }
            }
        }

        coordinates.par_sort_unstable();
        pattern_from_sorted_coordinates(element_assembler.num_nodes(), coordinates)
    }
}

/// Element nodes paired with an element contribution.
type ElementContribution<M> = Result<(Vec<usize>, M), FemError>;

impl<T: Real> CsrParAssembler<T> {
    pub fn assemble<A>(&self, element_assembler: &A) -> Result<CsrMatrix<T>, FemError>
    where
        A: ?Sized + ElementMatrixAssembler<T> + Sync,
    {
        let pattern = self.assemble_pattern(element_assembler);
        let mut matrix = zero_csr(pattern);
        self.assemble_into_csr(&mut matrix, element_assembler)?;
        Ok(matrix)
    }

    pub fn assemble_into_csr<A>(&self, csr: &mut CsrMatrix<T>, element_assembler: &A) -> Result<(), FemError>
    where
        A: ?Sized + ElementMatrixAssembler<T> + Sync,
    {
        check_global_size("global matrix rows", element_assembler.num_nodes(), csr.nrows())?;
        let ws = &mut *self.workspace.borrow_mut();

        for chunk in self.chunks(element_assembler.num_elements()) {
            trace!("Computing element matrices {}..{} in parallel", chunk.start, chunk.end);
            let contributions: Vec<ElementContribution<DMatrix<T>>> = chunk
                .into_par_iter()
                .map(|element_index| {
                    let element_node_count = element_assembler.element_node_count(element_index);
                    let mut nodes = vec![0; element_node_count];
                    element_assembler.populate_element_nodes(&mut nodes, element_index);
                    let mut element_matrix = DMatrix::zeros(element_node_count, element_node_count);
                    element_assembler
                        .assemble_element_matrix_into(element_index, DMatrixViewMut::from(&mut element_matrix))?;
                    Ok((nodes, element_matrix))
                })
                .collect();

            // Scatter in element order, reporting the first failing element
            for contribution in contributions {
                let (nodes, element_matrix) = contribution?;
                scatter_element_matrix(csr, &nodes, &mut ws.connectivity_permutation, &element_matrix)?;
            }
        }

        Ok(())
    }

    pub fn assemble_vector_into<A>(&self, vector: &mut DVector<T>, element_assembler: &A) -> Result<(), FemError>
    where
        A: ?Sized + ElementVectorAssembler<T> + Sync,
    {
        check_global_size("global vector", element_assembler.num_nodes(), vector.len())?;
        for chunk in self.chunks(element_assembler.num_elements()) {
            let contributions: Vec<ElementContribution<DVector<T>>> = chunk
                .into_par_iter()
                .map(|element_index| {
                    let element_node_count = element_assembler.element_node_count(element_index);
                    let mut nodes = vec![0; element_node_count];
                    element_assembler.populate_element_nodes(&mut nodes, element_index);
                    let mut element_vector = DVector::zeros(element_node_count);
                    element_assembler
                        .assemble_element_vector_into(element_index, DVectorViewMut::from(&mut element_vector))?;
                    Ok((nodes, element_vector))
                })
                .collect();

            for contribution in contributions {
                let (nodes, element_vector) = contribution?;
                for (&global, &value) in nodes.iter().zip(element_vector.iter()) {
                    vector[global] += value;
                }
            }
        }
        Ok(())
    }
}

fn zero_csr<T: Real>(pattern: SparsityPattern) -> CsrMatrix<T> {
    let values = vec![T::zero(); pattern.nnz()];
    CsrMatrix::try_from_pattern_and_values(pattern, values)
        .expect("Value count always matches the pattern")
}

/// Adds a square element matrix to the rows and columns of the given global nodes.
fn scatter_element_matrix<T: Real>(
    csr: &mut CsrMatrix<T>,
    element_global_nodes: &[usize],
    connectivity_permutation: &mut Vec<usize>,
    element_matrix: &DMatrix<T>,
) -> Result<(), FemError> {
    connectivity_permutation.clear();
    connectivity_permutation.extend(0..element_global_nodes.len());
    connectivity_permutation.sort_unstable_by_key(|i| element_global_nodes[*i]);

    for (local_row_index, &global_row_index) in element_global_nodes.iter().enumerate() {
        let mut csr_row = csr.row_mut(global_row_index);
        let (column_indices, values) = csr_row.cols_and_values_mut();
        add_element_row_to_csr_row(
            global_row_index,
            column_indices,
            values,
            element_global_nodes,
            connectivity_permutation,
            &element_matrix.row(local_row_index),
        )?;
    }
    Ok(())
}

/// Adds a row of a local element matrix to the provided row of a CSR matrix.
///
/// `node_connectivity`: The global indices of nodes.
/// `sorted_permutation`: The local indices of nodes in the element, ordered such that the
///    corresponding global indices are sorted.
/// `local_row`: The local row of the element matrix that should be added to the CSR matrix.
fn add_element_row_to_csr_row<T, S>(
    global_row_index: usize,
    column_indices: &[usize],
    values: &mut [T],
    node_connectivity: &[usize],
    sorted_permutation: &[usize],
    local_row: &Matrix<T, U1, Dyn, S>,
) -> Result<(), FemError>
where
    T: Real,
    S: Storage<T, U1, Dyn>,
{
    assert_eq!(node_connectivity.len(), sorted_permutation.len());
    assert_eq!(node_connectivity.len(), local_row.ncols());

    // Both the CSR columns and the permuted element columns are sorted, so a single forward
    // pass over the CSR row suffices
    let mut csr_col_idx_iter = column_indices.iter().copied().enumerate();
    for &node_local_idx in sorted_permutation {
        let global_col_index = node_connectivity[node_local_idx];
        let (local_csr_col_idx, _) = csr_col_idx_iter
            .find(|&(_, csr_col_idx)| csr_col_idx == global_col_index)
            .ok_or_else(|| {
                FemError::topology(format!(
                    "entry ({}, {}) is not part of the sparsity pattern",
                    global_row_index, global_col_index
                ))
            })?;
        values[local_csr_col_idx] += local_row[node_local_idx];
    }
    Ok(())
}

/// A global sparse matrix together with its right-hand side.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSystem<T> {
    matrix: CsrMatrix<T>,
    rhs: DVector<T>,
}

impl<T: Real> GlobalSystem<T> {
    /// Creates a zero system with the given (square) sparsity pattern.
    pub fn try_from_pattern(pattern: SparsityPattern) -> Result<Self, FemError> {
        check_global_size("sparsity pattern columns", pattern.major_dim(), pattern.minor_dim())?;
        let rhs = DVector::zeros(pattern.major_dim());
        Ok(Self {
            matrix: zero_csr(pattern),
            rhs,
        })
    }

    /// The number of rows (and columns) of the system.
    pub fn dof_count(&self) -> usize {
        self.rhs.len()
    }

    pub fn matrix(&self) -> &CsrMatrix<T> {
        &self.matrix
    }

    pub fn rhs(&self) -> &DVector<T> {
        &self.rhs
    }

    pub fn rhs_mut(&mut self) -> &mut DVector<T> {
        &mut self.rhs
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut CsrMatrix<T>, &mut DVector<T>) {
        (&mut self.matrix, &mut self.rhs)
    }

    pub fn into_parts(self) -> (CsrMatrix<T>, DVector<T>) {
        (self.matrix, self.rhs)
    }

    pub fn to_coo(&self) -> CooMatrix<T> {
        CooMatrix::from(&self.matrix)
    }

    /// Resets all stored values to zero, keeping the sparsity pattern.
    pub fn clear(&mut self) {
        self.matrix.values_mut().fill(T::zero());
        self.rhs.fill(T::zero());
    }

    fn check_global_indices(&self, global_indices: &[usize]) -> Result<(), FemError> {
        match global_indices.iter().find(|&&index| index >= self.dof_count()) {
            Some(index) => Err(FemError::topology(format!(
                "global index {} is out of bounds for system with {} rows",
                index,
                self.dof_count()
            ))),
            None => Ok(()),
        }
    }

    /// Adds a square local matrix to the rows and columns given by `global_indices`.
    ///
    /// Fails if an entry is not part of the sparsity pattern; rows before the offending row have
    /// already been updated in that case.
    pub fn add_element_matrix(&mut self, global_indices: &[usize], local: &DMatrix<T>) -> Result<(), FemError> {
        check_global_size("local matrix rows", global_indices.len(), local.nrows())?;
        check_global_size("local matrix columns", global_indices.len(), local.ncols())?;
        self.check_global_indices(global_indices)?;
        let mut permutation = Vec::with_capacity(global_indices.len());
        scatter_element_matrix(&mut self.matrix, global_indices, &mut permutation, local)
    }

    pub fn add_element_vector(&mut self, global_indices: &[usize], local: &DVector<T>) -> Result<(), FemError> {
        check_global_size("local vector", global_indices.len(), local.len())?;
        self.check_global_indices(global_indices)?;
        for (&global, &value) in global_indices.iter().zip(local.iter()) {
            self.rhs[global] += value;
        }
        Ok(())
    }
}

/// Assembles global matrices, vectors and complete linear systems over a finite element space.
#[derive(Debug, Clone)]
pub struct SystemAssembler<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    space: &'a FiniteElementSpace<T, D>,
    settings: AssemblySettings,
}

impl<'a, T, D> SystemAssembler<'a, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
    FiniteElementSpace<T, D>: Sync,
{
    pub fn new(space: &'a FiniteElementSpace<T, D>) -> Self {
        Self {
            space,
            settings: AssemblySettings::default(),
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

    fn local_assembler(&self) -> LocalAssembler<'a, T, D> {
        LocalAssembler::new(self.space).with_settings(self.settings)
    }

    /// The pattern of all DOF pairs that share a cell.
    pub fn assemble_pattern(&self) -> SparsityPattern {
        if self.settings.parallel {
            CsrParAssembler::<T>::default().assemble_pattern(self.space)
        } else {
            CsrAssembler::<T>::default().assemble_pattern(self.space)
        }
    }

    /// Creates a zero system whose pattern holds every DOF pair that shares a cell.
    pub fn create_system(&self) -> GlobalSystem<T> {
        GlobalSystem::try_from_pattern(self.assemble_pattern()).expect("Assembled patterns are square")
    }

    fn add_matrix_into<K>(&self, local: &LocalAssembler<'a, T, D>, csr: &mut CsrMatrix<T>, kernel: &K) -> Result<(), FemError>
    where
        K: ?Sized + BilinearKernel<T, D> + Sync,
    {
        let element_assembler = local.matrix_assembler(kernel);
        if self.settings.parallel {
            CsrParAssembler::default().assemble_into_csr(csr, &element_assembler)
        } else {
            CsrAssembler::default().assemble_into_csr(csr, &element_assembler)
        }
    }

    fn add_vector_into<K>(&self, local: &LocalAssembler<'a, T, D>, vector: &mut DVector<T>, kernel: &K) -> Result<(), FemError>
    where
        K: ?Sized + LinearKernel<T, D> + Sync,
    {
        let element_assembler = local.vector_assembler(kernel);
        if self.settings.parallel {
            CsrParAssembler::default().assemble_vector_into(vector, &element_assembler)
        } else {
            CsrAssembler::default().assemble_vector_into(vector, &element_assembler)
        }
    }

    pub fn assemble_matrix<K>(&self, kernel: &K) -> Result<CsrMatrix<T>, FemError>
    where
        K: ?Sized + BilinearKernel<T, D> + Sync,
    {
        let mut matrix = zero_csr(self.assemble_pattern());
        self.add_matrix_into(&self.local_assembler(), &mut matrix, kernel)?;
        debug!(
            "Assembled {}x{} matrix with {} non-zeros",
            matrix.nrows(),
            matrix.ncols(),
            matrix.nnz()
        );
        Ok(matrix)
    }

    pub fn assemble_vector<K>(&self, kernel: &K) -> Result<DVector<T>, FemError>
    where
        K: ?Sized + LinearKernel<T, D> + Sync,
    {
        let mut vector = DVector::zeros(self.space.dof_count());
        self.add_vector_into(&self.local_assembler(), &mut vector, kernel)?;
        Ok(vector)
    }

    /// Assembles the linear system of a bilinear and a linear form with boundary conditions.
    pub fn assemble_system<A, L>(
        &self,
        bilinear: &A,
        linear: &L,
        boundary_conditions: &BoundaryConditions<T, D>,
    ) -> Result<GlobalSystem<T>, FemError>
    where
        A: ?Sized + BilinearKernel<T, D> + Sync,
        L: ?Sized + LinearKernel<T, D> + Sync,
    {
        let mut system = self.create_system();
        self.assemble_system_into(&mut system, bilinear, linear, boundary_conditions)?;
        Ok(system)
    }

    /// Assembles into a previously created system, overwriting its values.
    ///
    /// Dirichlet constraints are validated before any assembly work is done. Natural conditions
    /// are added after the volume terms, and Dirichlet constraints are applied last.
    pub fn assemble_system_into<A, L>(
        &self,
        system: &mut GlobalSystem<T>,
        bilinear: &A,
        linear: &L,
        boundary_conditions: &BoundaryConditions<T, D>,
    ) -> Result<(), FemError>
    where
        A: ?Sized + BilinearKernel<T, D> + Sync,
        L: ?Sized + LinearKernel<T, D> + Sync,
    {
        check_global_size("global system", self.space.dof_count(), system.dof_count())?;
        let constraints = boundary_conditions
            .dirichlet_values(self.space, real(self.settings.constraint_tolerance))?;

        system.clear();
        let local = self.local_assembler();
        {
            let (matrix, rhs) = system.parts_mut();
            trace!("Assembling volume terms");
            self.add_matrix_into(&local, matrix, bilinear)?;
            self.add_vector_into(&local, rhs, linear)?;
        }
        trace!("Assembling natural boundary terms");
        boundary_conditions.add_natural_terms(&local, system)?;
        apply_dirichlet_constraints(system, &constraints, self.settings.dirichlet)?;

        debug!(
            "Assembled system with {} DOFs, {} non-zeros and {} constrained DOFs",
            system.dof_count(),
            system.matrix().nnz(),
            constraints.len()
        );
        Ok(())
    }
}
