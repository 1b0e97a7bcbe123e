//! Boundary conditions and their application to assembled systems.
use crate::allocators::DimAllocator;
use crate::assembly::global::GlobalSystem;
use crate::assembly::local::LocalAssembler;
use crate::assembly::DirichletStrategy;
use crate::error::{to_f64, FemError};
use crate::mesh::Mesh;
use crate::space::FiniteElementSpace;
use crate::util::real;
use crate::{Real, SmallDim};
use log::{trace, warn};
use nalgebra::{DefaultAllocator, OPoint, OVector};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

type ValueFn<T, D> = Arc<dyn Fn(&OPoint<T, D>) -> T + Send + Sync>;
type FluxFn<T, D> = Arc<dyn Fn(&OPoint<T, D>, &OVector<T, D>) -> T + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum DirichletTarget {
    Facets(Vec<usize>),
    Vertices(Vec<usize>),
}

struct DirichletCondition<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    target: DirichletTarget,
    value: ValueFn<T, D>,
}

struct NeumannCondition<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    facets: Vec<usize>,
    flux: FluxFn<T, D>,
}

struct RobinCondition<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    facets: Vec<usize>,
    coefficient: ValueFn<T, D>,
    flux: FluxFn<T, D>,
}

/// Essential and natural boundary conditions for a scalar problem.
///
/// - Dirichlet conditions `u = g` prescribe the value of every DOF on the given boundary
///   facets or at the given vertices, by evaluating `g` at the DOF nodes.
/// - Neumann conditions `du/dn = g` add `integral of g v` over the given facets to the
///   right-hand side. The function receives the outward unit normal.
/// - Robin conditions `kappa u + du/dn = g` additionally add `integral of kappa u v` to the
///   matrix.
///
/// Facets are given by their global mesh facet index and must lie on the boundary.
pub struct BoundaryConditions<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    dirichlet: Vec<DirichletCondition<T, D>>,
    neumann: Vec<NeumannCondition<T, D>>,
    robin: Vec<RobinCondition<T, D>>,
}

impl<T, D> Default for BoundaryConditions<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn default() -> Self {
        Self {
            dirichlet: Vec::new(),
            neumann: Vec::new(),
            robin: Vec::new(),
        }
    }
}

impl<T, D> Clone for BoundaryConditions<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn clone(&self) -> Self {
        Self {
            dirichlet: self
                .dirichlet
                .iter()
                .map(|c| DirichletCondition {
                    target: c.target.clone(),
                    value: Arc::clone(&c.value),
                })
                .collect(),
            neumann: self
                .neumann
                .iter()
                .map(|c| NeumannCondition {
                    facets: c.facets.clone(),
                    flux: Arc::clone(&c.flux),
                })
                .collect(),
            robin: self
                .robin
                .iter()
                .map(|c| RobinCondition {
                    facets: c.facets.clone(),
                    coefficient: Arc::clone(&c.coefficient),
                    flux: Arc::clone(&c.flux),
                })
                .collect(),
        }
    }
}

impl<T, D> Debug for BoundaryConditions<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryConditions")
            .field(
                "dirichlet",
                &self.dirichlet.iter().map(|c| &c.target).collect::<Vec<_>>(),
            )
            .field(
                "neumann",
                &self.neumann.iter().map(|c| &c.facets).collect::<Vec<_>>(),
            )
            .field("robin", &self.robin.iter().map(|c| &c.facets).collect::<Vec<_>>())
            .finish()
    }
}

impl<T, D> BoundaryConditions<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.dirichlet.is_empty() && self.neumann.is_empty() && self.robin.is_empty()
    }

    /// Prescribes `u = g` on all DOFs of the given boundary facets.
    pub fn with_dirichlet_on_facets<G>(mut self, facets: impl IntoIterator<Item = usize>, g: G) -> Self
    where
        G: Fn(&OPoint<T, D>) -> T + Send + Sync + 'static,
    {
        self.dirichlet.push(DirichletCondition {
            target: DirichletTarget::Facets(facets.into_iter().collect()),
            value: Arc::new(g),
        });
        self
    }

    /// Prescribes `u = g` on the DOFs attached to the given mesh vertices.
    pub fn with_dirichlet_on_vertices<G>(mut self, vertices: impl IntoIterator<Item = usize>, g: G) -> Self
    where
        G: Fn(&OPoint<T, D>) -> T + Send + Sync + 'static,
    {
        self.dirichlet.push(DirichletCondition {
            target: DirichletTarget::Vertices(vertices.into_iter().collect()),
            value: Arc::new(g),
        });
        self
    }

    pub fn with_neumann<G>(mut self, facets: impl IntoIterator<Item = usize>, g: G) -> Self
    where
        G: Fn(&OPoint<T, D>, &OVector<T, D>) -> T + Send + Sync + 'static,
    {
        self.neumann.push(NeumannCondition {
            facets: facets.into_iter().collect(),
            flux: Arc::new(g),
        });
        self
    }

    pub fn with_robin<K, G>(mut self, facets: impl IntoIterator<Item = usize>, kappa: K, g: G) -> Self
    where
        K: Fn(&OPoint<T, D>) -> T + Send + Sync + 'static,
        G: Fn(&OPoint<T, D>, &OVector<T, D>) -> T + Send + Sync + 'static,
    {
        self.robin.push(RobinCondition {
            facets: facets.into_iter().collect(),
            coefficient: Arc::new(kappa),
            flux: Arc::new(g),
        });
        self
    }

    /// Evaluates all Dirichlet conditions, returning the prescribed value of every constrained
    /// DOF.
    ///
    /// Every component of a vector-valued space receives the value of the condition at the node.
    /// Conditions are evaluated in the order they were added. A DOF that receives two values
    /// differing by more than `tolerance` is an [`FemError::InconsistentConstraint`].
    pub fn dirichlet_values(&self, space: &FiniteElementSpace<T, D>, tolerance: T) -> Result<BTreeMap<usize, T>, FemError> {
        let mut values = BTreeMap::new();
        for condition in &self.dirichlet {
            let dofs = match &condition.target {
                DirichletTarget::Facets(facets) => {
                    check_boundary_facets(space.mesh(), facets)?;
                    let mut dofs = Vec::new();
                    for &facet in facets {
                        dofs.extend(space.facet_dofs(facet)?);
                    }
                    dofs.sort_unstable();
                    dofs.dedup();
                    dofs
                }
                DirichletTarget::Vertices(vertices) => {
                    let mut dofs = Vec::new();
                    for &vertex in vertices {
                        let vertex_dofs = space.vertex_dofs(vertex)?;
                        if vertex_dofs.is_empty() {
                            warn!("Dirichlet condition on vertex {} constrains no DOFs", vertex);
                        }
                        dofs.extend(vertex_dofs);
                    }
                    dofs.sort_unstable();
                    dofs.dedup();
                    dofs
                }
            };

            for dof in dofs {
                let prescribed = (condition.value)(space.dof_point(dof));
                match values.entry(dof) {
                    Entry::Vacant(entry) => {
                        entry.insert(prescribed);
                    }
                    Entry::Occupied(entry) => {
                        let existing = *entry.get();
                        if (existing - prescribed).abs() > tolerance {
                            return Err(FemError::InconsistentConstraint {
                                dof,
                                existing: to_f64(existing),
                                prescribed: to_f64(prescribed),
                            });
                        }
                    }
                }
            }
        }
        trace!("Evaluated Dirichlet values for {} DOFs", values.len());
        Ok(values)
    }

    /// Adds Neumann and Robin contributions to an assembled system, facet by facet in the
    /// order the conditions were added.
    pub(crate) fn add_natural_terms(
        &self,
        local: &LocalAssembler<T, D>,
        system: &mut GlobalSystem<T>,
    ) -> Result<(), FemError> {
        let space = local.space();
        let mesh = space.mesh();
        for condition in &self.neumann {
            check_boundary_facets(mesh, &condition.facets)?;
            for &facet in &condition.facets {
                for (cell, local_facet) in mesh.facet_incidences(facet) {
                    let vector = local.local_facet_vector(cell, local_facet, |x, n| (condition.flux)(x, n))?;
                    system.add_element_vector(space.local_to_global(cell), &vector)?;
                }
            }
        }
        for condition in &self.robin {
            check_boundary_facets(mesh, &condition.facets)?;
            for &facet in &condition.facets {
                for (cell, local_facet) in mesh.facet_incidences(facet) {
                    let global = space.local_to_global(cell);
                    let matrix = local.local_facet_matrix(cell, local_facet, |x| (condition.coefficient)(x))?;
                    system.add_element_matrix(global, &matrix)?;
                    let vector = local.local_facet_vector(cell, local_facet, |x, n| (condition.flux)(x, n))?;
                    system.add_element_vector(global, &vector)?;
                }
            }
        }
        Ok(())
    }
}

fn check_boundary_facets<T, D>(mesh: &Mesh<T, D>, facets: &[usize]) -> Result<(), FemError>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    for &facet in facets {
        if facet >= mesh.num_facets() {
            return Err(FemError::topology(format!(
                "facet index {} is out of bounds for mesh with {} facets",
                facet,
                mesh.num_facets()
            )));
        }
        if mesh.facet_cells(facet).len() != 1 {
            return Err(FemError::topology(format!("facet {} is not on the boundary", facet)));
        }
    }
    Ok(())
}

/// Enforces `u_i = g_i` for every `(i, g_i)` in `constraints` on an assembled system.
///
/// With [`DirichletStrategy::SymmetricElimination`], constrained rows and columns are zeroed
/// with a unit diagonal, and the eliminated column entries are moved to the right-hand side.
/// A symmetric system therefore stays symmetric. [`DirichletStrategy::RowElimination`] only
/// replaces the constrained rows. [`DirichletStrategy::Penalty`] adds a large multiple of the
/// largest diagonal entry to the constrained diagonal entries.
pub fn apply_dirichlet_constraints<T: Real>(
    system: &mut GlobalSystem<T>,
    constraints: &BTreeMap<usize, T>,
    strategy: DirichletStrategy,
) -> Result<(), FemError> {
    let n = system.dof_count();
    let mut prescribed = vec![None; n];
    for (&dof, &value) in constraints {
        if dof >= n {
            return Err(FemError::topology(format!(
                "constrained DOF {} is out of bounds for system with {} rows",
                dof, n
            )));
        }
        prescribed[dof] = Some(value);
    }

    let (matrix, rhs) = system.parts_mut();
    match strategy {
        DirichletStrategy::SymmetricElimination => {
            for i in 0..n {
                let mut row = matrix.row_mut(i);
                let (cols, values) = row.cols_and_values_mut();
                match prescribed[i] {
                    Some(g) => {
                        for (&j, value) in cols.iter().zip(values) {
                            *value = if j == i { T::one() } else { T::zero() };
                        }
                        rhs[i] = g;
                    }
                    None => {
                        for (&j, value) in cols.iter().zip(values) {
                            if let Some(g) = prescribed[j] {
                                rhs[i] -= *value * g;
                                *value = T::zero();
                            }
                        }
                    }
                }
            }
        }
        DirichletStrategy::RowElimination => {
            for (&i, &g) in constraints {
                let mut row = matrix.row_mut(i);
                let (cols, values) = row.cols_and_values_mut();
                for (&j, value) in cols.iter().zip(values) {
                    *value = if j == i { T::one() } else { T::zero() };
                }
                rhs[i] = g;
            }
        }
        DirichletStrategy::Penalty { factor } => {
            let max_diagonal = matrix
                .diagonal_as_csr()
                .values()
                .iter()
                .fold(T::zero(), |acc, d| acc.max(d.abs()));
            let scale = real::<T>(factor) * if max_diagonal > T::zero() { max_diagonal } else { T::one() };
            for (&i, &g) in constraints {
                let mut row = matrix.row_mut(i);
                let (cols, values) = row.cols_and_values_mut();
                if let Some(k) = cols.iter().position(|&j| j == i) {
                    values[k] += scale;
                } else {
                    return Err(FemError::topology(format!(
                        "diagonal entry of constrained DOF {} is not part of the sparsity pattern",
                        i
                    )));
                }
                rhs[i] += scale * g;
            }
        }
    }
    Ok(())
}
