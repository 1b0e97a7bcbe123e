//! Basis data tabulated at quadrature points, and per-thread caches of such data.
use crate::connectivity::ReferenceCell;
use crate::element::{LagrangeBasis, ReferenceFiniteElement, VertexBasis};
use crate::error::FemError;
use crate::quadrature::{facet_rule, QuadratureRule, QuadratureTable};
use crate::util::real;
use crate::Real;
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Reference data at a single quadrature point.
#[derive(Debug, Clone)]
pub(crate) struct TabulatedPoint<T> {
    pub weight: T,
    /// Reference coordinates of the point in the cell.
    pub reference_coords: Vec<T>,
    pub basis_values: Vec<T>,
    /// `reference_dim x num_nodes`
    pub basis_gradients: DMatrix<T>,
    /// Values of the vertex basis of the cell, which drives the geometry map.
    pub shape_values: Vec<T>,
    /// `reference_dim x num_vertices`
    pub shape_gradients: DMatrix<T>,
    /// For facet points, gradients of the vertex basis of the facet with respect to the facet
    /// reference coordinates, `(reference_dim - 1) x num_facet_vertices`. Empty for cell points.
    pub facet_shape_gradients: DMatrix<T>,
}

/// A basis tabulated at every point of a quadrature rule, either on a cell or on one of its
/// facets.
#[derive(Debug, Clone)]
pub(crate) struct BasisTabulation<T> {
    points: Vec<TabulatedPoint<T>>,
    reference_barycenter: Vec<T>,
}

impl<T: Real> BasisTabulation<T> {
    fn tabulate_point(basis: &LagrangeBasis<T>, weight: T, reference_coords: Vec<T>) -> TabulatedPoint<T> {
        let vertex_basis = VertexBasis::new(basis.shape());
        TabulatedPoint {
            weight,
            basis_values: basis.evaluate_basis(&reference_coords).as_slice().to_vec(),
            basis_gradients: basis.evaluate_basis_gradients(&reference_coords),
            shape_values: ReferenceFiniteElement::<T>::evaluate_basis(&vertex_basis, &reference_coords)
                .as_slice()
                .to_vec(),
            shape_gradients: ReferenceFiniteElement::<T>::evaluate_basis_gradients(&vertex_basis, &reference_coords),
            facet_shape_gradients: DMatrix::zeros(0, 0),
            reference_coords,
        }
    }

    fn new(shape: ReferenceCell, points: Vec<TabulatedPoint<T>>) -> Self {
        Self {
            points,
            reference_barycenter: shape
                .reference_barycenter()
                .iter()
                .map(|&x| real(x))
                .collect(),
        }
    }

    pub fn from_cell_rule(basis: &LagrangeBasis<T>, rule: &QuadratureRule<T>) -> Self {
        let points = rule
            .points()
            .zip(rule.weights())
            .map(|(xi, &w)| Self::tabulate_point(basis, w, xi.to_vec()))
            .collect();
        Self::new(basis.shape(), points)
    }

    /// Tabulates the cell basis at the points of a facet rule mapped onto the given local facet.
    pub fn from_facet_rule(basis: &LagrangeBasis<T>, local_facet: usize, rule: &QuadratureRule<T>) -> Self {
        let shape = basis.shape();
        let facet_vertices = shape.facets()[local_facet];
        let d = shape.reference_dim();
        let points = rule
            .points()
            .zip(rule.weights())
            .map(|(eta, &w)| {
                let (facet_values, facet_gradients) = match shape.facet_shape(local_facet) {
                    Some(facet_shape) => {
                        let facet_basis = VertexBasis::new(facet_shape);
                        (
                            ReferenceFiniteElement::<T>::evaluate_basis(&facet_basis, eta)
                                .as_slice()
                                .to_vec(),
                            ReferenceFiniteElement::<T>::evaluate_basis_gradients(&facet_basis, eta),
                        )
                    }
                    None => (vec![T::one()], DMatrix::zeros(0, 1)),
                };
                let mut xi = vec![T::zero(); d];
                for (&local_vertex, &psi) in facet_vertices.iter().zip(&facet_values) {
                    for (x, &c) in xi.iter_mut().zip(shape.reference_vertex(local_vertex)) {
                        *x += psi * real::<T>(c);
                    }
                }
                let mut point = Self::tabulate_point(basis, w, xi);
                point.facet_shape_gradients = facet_gradients;
                point
            })
            .collect();
        Self::new(shape, points)
    }

    pub fn points(&self) -> &[TabulatedPoint<T>] {
        &self.points
    }

    pub fn reference_barycenter(&self) -> &[T] {
        &self.reference_barycenter
    }
}

/// Lazily created quadrature rules and tabulations, keyed by shape and quadrature degree.
///
/// Each worker thread owns one cache, so the cached data never needs synchronization.
#[derive(Debug)]
pub(crate) struct TabulationCache<T> {
    rules: FxHashMap<usize, QuadratureTable<T>>,
    cells: FxHashMap<(ReferenceCell, usize), Arc<BasisTabulation<T>>>,
    facets: FxHashMap<(ReferenceCell, usize, usize), Arc<BasisTabulation<T>>>,
}

impl<T> Default for TabulationCache<T> {
    fn default() -> Self {
        Self {
            rules: FxHashMap::default(),
            cells: FxHashMap::default(),
            facets: FxHashMap::default(),
        }
    }
}

impl<T: Real> TabulationCache<T> {
    pub fn cell_tabulation(
        &mut self,
        basis: &LagrangeBasis<T>,
        quadrature_degree: usize,
    ) -> Result<Arc<BasisTabulation<T>>, FemError> {
        let key = (basis.shape(), quadrature_degree);
        if let Some(tabulation) = self.cells.get(&key) {
            return Ok(Arc::clone(tabulation));
        }
        let rule = self
            .rules
            .entry(quadrature_degree)
            .or_insert_with(|| QuadratureTable::new(quadrature_degree))
            .rule_for(basis.shape())?;
        let tabulation = Arc::new(BasisTabulation::from_cell_rule(basis, &rule));
        self.cells.insert(key, Arc::clone(&tabulation));
        Ok(tabulation)
    }

    pub fn facet_tabulation(
        &mut self,
        basis: &LagrangeBasis<T>,
        local_facet: usize,
        quadrature_degree: usize,
    ) -> Result<Arc<BasisTabulation<T>>, FemError> {
        let key = (basis.shape(), quadrature_degree, local_facet);
        if let Some(tabulation) = self.facets.get(&key) {
            return Ok(Arc::clone(tabulation));
        }
        let rule = facet_rule(basis.shape(), quadrature_degree)?;
        let tabulation = Arc::new(BasisTabulation::from_facet_rule(basis, local_facet, &rule));
        self.facets.insert(key, Arc::clone(&tabulation));
        Ok(tabulation)
    }
}
