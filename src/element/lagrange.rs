use crate::connectivity::{LocalEntity, ReferenceCell};
use crate::element::ReferenceFiniteElement;
use crate::error::FemError;
use crate::util::real;
use crate::Real;
use nalgebra::DMatrix;
use smallvec::SmallVec;
use std::cmp::Reverse;

/// The highest polynomial degree for which Lagrange bases can be constructed.
///
/// Equispaced nodes become badly conditioned at high degrees, so larger degrees are rejected.
pub const MAX_DEGREE: usize = 10;

type MultiIndex = SmallVec<[usize; 4]>;

/// Describes where a local degree of freedom sits on its reference cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDof {
    entity: LocalEntity,
    vertex_weights: SmallVec<[(usize, usize); 8]>,
}

impl LocalDof {
    /// The lowest-dimensional entity of the reference cell that contains the node.
    pub fn entity(&self) -> LocalEntity {
        self.entity
    }

    /// Pairs `(local vertex, weight)` with non-zero integer weights that locate the node
    /// relative to the vertices of its entity.
    ///
    /// For simplices the weights are the barycentric multi-index of the node, for tensor cells
    /// the product of the one-dimensional node offsets. Weights are divided by their greatest
    /// common divisor, so two nodes at the same physical position of a shared entity have the
    /// same weights when expressed in global vertex indices, regardless of which cell
    /// (or cell shape) they are seen from.
    pub fn vertex_weights(&self) -> &[(usize, usize)] {
        &self.vertex_weights
    }
}

/// Nodal Lagrange basis of arbitrary degree on a reference cell.
///
/// Nodes are equispaced. Simplicial bases are built from barycentric multi-indices, while
/// quadrilateral and hexahedral bases are tensor products of one-dimensional Lagrange
/// polynomials. The local ordering is: vertex nodes in vertex order, then edge-interior nodes
/// edge by edge, then face-interior nodes (three-dimensional cells only), then cell-interior
/// nodes. In particular, the degree 1 basis is ordered like the vertices of the cell.
#[derive(Debug, Clone)]
pub struct LagrangeBasis<T> {
    shape: ReferenceCell,
    degree: usize,
    multi_indices: Vec<MultiIndex>,
    // Reference coordinates of all nodes, `reference_dim` entries per node
    nodes: Vec<T>,
    dofs: Vec<LocalDof>,
    facet_dofs: Vec<Vec<usize>>,
    // One-dimensional nodes on [-1, 1], only used by tensor cells
    nodes_1d: Vec<T>,
}

struct NodeEntry {
    multi_index: MultiIndex,
    entity: LocalEntity,
    weights: SmallVec<[usize; 8]>,
}

impl<T: Real> LagrangeBasis<T> {
    pub fn try_new(shape: ReferenceCell, degree: usize) -> Result<Self, FemError> {
        if degree > MAX_DEGREE {
            return Err(FemError::UnsupportedDegree { shape, degree });
        }

        let d = shape.reference_dim();
        let num_vertices = shape.num_vertices();
        let multi_indices = if shape.is_simplex() {
            simplex_multi_indices(d + 1, degree)
        } else {
            tensor_multi_indices(d, degree)
        };

        let mut entries: Vec<NodeEntry> = multi_indices
            .into_iter()
            .map(|multi_index| {
                let weights: SmallVec<[usize; 8]> = (0..num_vertices)
                    .map(|v| vertex_weight(shape, degree, &multi_index, v))
                    .collect();
                let support: SmallVec<[usize; 8]> = (0..num_vertices).filter(|&v| weights[v] > 0).collect();
                let entity = if support.is_empty() {
                    LocalEntity::Interior
                } else {
                    shape
                        .entity_spanned_by(&support)
                        .unwrap_or(LocalEntity::Interior)
                };
                NodeEntry {
                    multi_index,
                    entity,
                    weights,
                }
            })
            .collect();

        entries.sort_by_cached_key(|entry| {
            let within_entity: SmallVec<[usize; 8]> = entity_vertices(shape, entry.entity)
                .iter()
                .map(|&v| entry.weights[v])
                .collect();
            (entry.entity.ordering_key(), Reverse(within_entity))
        });

        let nodes_1d: Vec<T> = if degree == 0 {
            vec![T::zero()]
        } else {
            (0..=degree)
                .map(|i| real::<T>(-1.0 + 2.0 * i as f64 / degree as f64))
                .collect()
        };

        let mut nodes = Vec::with_capacity(entries.len() * d);
        for entry in &entries {
            if shape.is_simplex() {
                if degree == 0 {
                    nodes.extend(shape.reference_barycenter().iter().map(|&x| real::<T>(x)));
                } else {
                    // Vertex v > 0 of the unit simplex is the unit vector e_{v - 1}
                    nodes.extend((0..d).map(|a| real::<T>(entry.multi_index[a + 1] as f64 / degree as f64)));
                }
            } else {
                nodes.extend(entry.multi_index.iter().map(|&i| nodes_1d[i]));
            }
        }

        let dofs: Vec<LocalDof> = entries
            .iter()
            .map(|entry| {
                let divisor = entry
                    .weights
                    .iter()
                    .copied()
                    .filter(|&w| w > 0)
                    .fold(0, gcd)
                    .max(1);
                LocalDof {
                    entity: entry.entity,
                    vertex_weights: entry
                        .weights
                        .iter()
                        .enumerate()
                        .filter(|&(_, &w)| w > 0)
                        .map(|(v, &w)| (v, w / divisor))
                        .collect(),
                }
            })
            .collect();

        let facet_dofs = shape
            .facets()
            .iter()
            .map(|facet| {
                dofs.iter()
                    .enumerate()
                    .filter(|(_, dof)| {
                        !dof.vertex_weights.is_empty() && dof.vertex_weights.iter().all(|(v, _)| facet.contains(v))
                    })
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();

        Ok(Self {
            shape,
            degree,
            multi_indices: entries.into_iter().map(|entry| entry.multi_index).collect(),
            nodes,
            dofs,
            facet_dofs,
            nodes_1d,
        })
    }

    pub fn shape(&self) -> ReferenceCell {
        self.shape
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Reference coordinates of the node associated with the given basis function.
    pub fn node(&self, local_index: usize) -> &[T] {
        let d = self.shape.reference_dim();
        &self.nodes[d * local_index..d * (local_index + 1)]
    }

    pub fn local_dofs(&self) -> &[LocalDof] {
        &self.dofs
    }

    /// The multi-index of the given basis function.
    ///
    /// Barycentric (with `reference_dim + 1` entries summing to the degree) for simplices,
    /// one-dimensional node indices per axis for tensor cells.
    pub fn multi_index(&self, local_index: usize) -> &[usize] {
        &self.multi_indices[local_index]
    }

    /// Finds the basis function with the given multi-index.
    pub fn find_multi_index(&self, multi_index: &[usize]) -> Option<usize> {
        self.multi_indices
            .iter()
            .position(|candidate| candidate.as_slice() == multi_index)
    }

    /// Local indices of the basis functions whose nodes lie on the given local facet.
    pub fn facet_dofs(&self, local_facet: usize) -> &[usize] {
        &self.facet_dofs[local_facet]
    }

    fn barycentric_coordinates(&self, reference_coords: &[T]) -> SmallVec<[T; 4]> {
        let mut lambda = SmallVec::new();
        let sum = reference_coords
            .iter()
            .fold(T::zero(), |acc, &x| acc + x);
        lambda.push(T::one() - sum);
        lambda.extend(reference_coords.iter().copied());
        lambda
    }

    /// Values and derivatives of all one-dimensional Lagrange polynomials along each axis.
    fn tensor_factors(&self, reference_coords: &[T]) -> SmallVec<[(Vec<T>, Vec<T>); 3]> {
        reference_coords
            .iter()
            .map(|&s| {
                (0..self.nodes_1d.len())
                    .map(|i| lagrange_1d(&self.nodes_1d, i, s))
                    .unzip::<T, T, Vec<T>, Vec<T>>()
            })
            .collect()
    }
}

impl<T: Real> ReferenceFiniteElement<T> for LagrangeBasis<T> {
    fn reference_dim(&self) -> usize {
        self.shape.reference_dim()
    }

    fn num_nodes(&self) -> usize {
        self.multi_indices.len()
    }

    fn populate_basis(&self, basis_values: &mut [T], reference_coords: &[T]) {
        assert_eq!(basis_values.len(), self.num_nodes(), "output must have one entry per node");
        assert_eq!(reference_coords.len(), self.reference_dim());

        if self.shape.is_simplex() {
            let lambda = self.barycentric_coordinates(reference_coords);
            for (value, alpha) in basis_values.iter_mut().zip(&self.multi_indices) {
                *value = alpha
                    .iter()
                    .zip(&lambda)
                    .map(|(&m, &t)| barycentric_factor(self.degree, m, t).0)
                    .fold(T::one(), |acc, f| acc * f);
            }
        } else {
            let factors = self.tensor_factors(reference_coords);
            for (value, index) in basis_values.iter_mut().zip(&self.multi_indices) {
                *value = index
                    .iter()
                    .zip(&factors)
                    .map(|(&i, (values, _))| values[i])
                    .fold(T::one(), |acc, f| acc * f);
            }
        }
    }

    fn populate_basis_gradients(&self, basis_gradients: &mut DMatrix<T>, reference_coords: &[T]) {
        let d = self.reference_dim();
        assert_eq!(basis_gradients.nrows(), d, "gradient matrix must have reference_dim rows");
        assert_eq!(basis_gradients.ncols(), self.num_nodes(), "gradient matrix must have one column per node");
        assert_eq!(reference_coords.len(), d);

        if self.shape.is_simplex() {
            let lambda = self.barycentric_coordinates(reference_coords);
            for (i, alpha) in self.multi_indices.iter().enumerate() {
                let factors: SmallVec<[(T, T); 4]> = alpha
                    .iter()
                    .zip(&lambda)
                    .map(|(&m, &t)| barycentric_factor(self.degree, m, t))
                    .collect();
                // Derivative with respect to each barycentric coordinate
                let dlambda = |k: usize| {
                    factors
                        .iter()
                        .enumerate()
                        .map(|(j, &(f, df))| if j == k { df } else { f })
                        .fold(T::one(), |acc, f| acc * f)
                };
                let d0 = dlambda(0);
                for a in 0..d {
                    basis_gradients[(a, i)] = dlambda(a + 1) - d0;
                }
            }
        } else {
            let factors = self.tensor_factors(reference_coords);
            for (i, index) in self.multi_indices.iter().enumerate() {
                for a in 0..d {
                    basis_gradients[(a, i)] = index
                        .iter()
                        .zip(&factors)
                        .enumerate()
                        .map(|(b, (&ib, (values, derivatives)))| if a == b { derivatives[ib] } else { values[ib] })
                        .fold(T::one(), |acc, f| acc * f);
                }
            }
        }
    }
}

/// The factor `prod_{j < m} (p t - j) / (j + 1)` of a barycentric Lagrange polynomial and its
/// derivative with respect to `t`.
fn barycentric_factor<T: Real>(degree: usize, m: usize, t: T) -> (T, T) {
    let p = real::<T>(degree as f64);
    let mut value = T::one();
    let mut derivative = T::zero();
    for j in 0..m {
        let denominator = real::<T>((j + 1) as f64);
        let f = (p * t - real::<T>(j as f64)) / denominator;
        let df = p / denominator;
        derivative = derivative * f + value * df;
        value *= f;
    }
    (value, derivative)
}

/// Value and derivative of the `i`-th one-dimensional Lagrange polynomial over `nodes`.
fn lagrange_1d<T: Real>(nodes: &[T], i: usize, s: T) -> (T, T) {
    let mut value = T::one();
    let mut derivative = T::zero();
    for (k, &s_k) in nodes.iter().enumerate() {
        if k != i {
            let denominator = nodes[i] - s_k;
            let f = (s - s_k) / denominator;
            derivative = derivative * f + value / denominator;
            value *= f;
        }
    }
    (value, derivative)
}

fn simplex_multi_indices(num_parts: usize, degree: usize) -> Vec<MultiIndex> {
    fn recurse(remaining_parts: usize, remaining_degree: usize, current: &mut MultiIndex, result: &mut Vec<MultiIndex>) {
        if remaining_parts == 1 {
            current.push(remaining_degree);
            result.push(current.clone());
            current.pop();
        } else {
            for m in (0..=remaining_degree).rev() {
                current.push(m);
                recurse(remaining_parts - 1, remaining_degree - m, current, result);
                current.pop();
            }
        }
    }

    let mut result = Vec::new();
    recurse(num_parts, degree, &mut MultiIndex::new(), &mut result);
    result
}

fn tensor_multi_indices(dim: usize, degree: usize) -> Vec<MultiIndex> {
    let n = degree + 1;
    let total = n.pow(dim as u32);
    (0..total)
        .map(|mut linear| {
            (0..dim)
                .map(|_| {
                    let i = linear % n;
                    linear /= n;
                    i
                })
                .collect()
        })
        .collect()
}

/// Integer weight of the given local vertex for a node.
fn vertex_weight(shape: ReferenceCell, degree: usize, multi_index: &[usize], vertex: usize) -> usize {
    if shape.is_simplex() {
        multi_index[vertex]
    } else {
        shape
            .reference_vertex(vertex)
            .iter()
            .zip(multi_index)
            .map(|(&c, &i)| if c < 0.0 { degree - i } else { i })
            .product()
    }
}

fn entity_vertices(shape: ReferenceCell, entity: LocalEntity) -> SmallVec<[usize; 8]> {
    match entity {
        LocalEntity::Vertex(v) => SmallVec::from_slice(&[v]),
        LocalEntity::Edge(e) => SmallVec::from_slice(&shape.edges()[e]),
        LocalEntity::Face(f) => SmallVec::from_slice(shape.faces()[f]),
        LocalEntity::Interior => (0..shape.num_vertices()).collect(),
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}
