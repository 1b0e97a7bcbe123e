//! Quadrature rules on reference cells.
//!
//! The rules themselves are computed in double precision by `galerkin-quadrature`; this module
//! converts them to the scalar type in use and attaches the shape information needed by the
//! assemblers.
use crate::connectivity::ReferenceCell;
use crate::error::FemError;
use crate::util::real;
use crate::Real;
use galerkin_quadrature::{simplex, tensor, Point};
use std::sync::Arc;

/// A quadrature rule on a reference domain of a fixed dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule<T> {
    reference_dim: usize,
    strength: usize,
    weights: Vec<T>,
    // Contiguous point coordinates, `reference_dim` entries per point
    points: Vec<T>,
}

impl<T: Real> QuadratureRule<T> {
    fn from_f64_rule<const D: usize>(strength: usize, (weights, points): (Vec<f64>, Vec<Point<D>>)) -> Self {
        Self {
            reference_dim: D,
            strength,
            weights: weights.into_iter().map(real).collect(),
            points: points.iter().flatten().map(|&x| real(x)).collect(),
        }
    }

    /// The rule on a zero-dimensional domain: a single point with unit weight.
    pub fn single_point() -> Self {
        Self {
            reference_dim: 0,
            strength: usize::MAX,
            weights: vec![T::one()],
            points: Vec::new(),
        }
    }

    pub fn reference_dim(&self) -> usize {
        self.reference_dim
    }

    /// The highest total polynomial degree integrated exactly.
    pub fn strength(&self) -> usize {
        self.strength
    }

    pub fn num_points(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    /// Reference coordinates of the `q`-th point.
    pub fn point(&self, q: usize) -> &[T] {
        let d = self.reference_dim;
        &self.points[d * q..d * (q + 1)]
    }

    pub fn points(&self) -> impl Iterator<Item = &[T]> {
        (0..self.num_points()).map(move |q| self.point(q))
    }

    /// Approximates the integral of `f` over the reference domain.
    pub fn integrate<F>(&self, mut f: F) -> T
    where
        F: FnMut(&[T]) -> T,
    {
        self.weights
            .iter()
            .enumerate()
            .fold(T::zero(), |acc, (q, &w)| acc + w * f(self.point(q)))
    }
}

/// Returns a rule on the given reference cell that integrates all polynomials of total degree
/// at most `degree` exactly.
///
/// Repeated calls with the same arguments produce bit-identical rules.
pub fn rule<T: Real>(shape: ReferenceCell, degree: usize) -> Result<QuadratureRule<T>, FemError> {
    let unsupported = |_| FemError::UnsupportedDegree { shape, degree };
    let rule = match shape {
        ReferenceCell::Interval => QuadratureRule::from_f64_rule(degree, simplex::interval(degree).map_err(unsupported)?),
        ReferenceCell::Triangle => QuadratureRule::from_f64_rule(degree, simplex::triangle(degree).map_err(unsupported)?),
        ReferenceCell::Tetrahedron => {
            QuadratureRule::from_f64_rule(degree, simplex::tetrahedron(degree).map_err(unsupported)?)
        }
        ReferenceCell::Quadrilateral => {
            QuadratureRule::from_f64_rule(degree, tensor::quadrilateral(degree).map_err(unsupported)?)
        }
        ReferenceCell::Hexahedron => {
            QuadratureRule::from_f64_rule(degree, tensor::hexahedron(degree).map_err(unsupported)?)
        }
    };
    Ok(rule)
}

/// Returns the rule used to integrate over the facets of cells with the given shape.
///
/// The vertex facets of intervals get [`QuadratureRule::single_point`].
pub fn facet_rule<T: Real>(cell_shape: ReferenceCell, degree: usize) -> Result<QuadratureRule<T>, FemError> {
    match cell_shape.facet_shape(0) {
        Some(facet_shape) => rule(facet_shape, degree),
        None => Ok(QuadratureRule::single_point()),
    }
}

/// Quadrature rules of a fixed degree for every reference cell, created on demand.
///
/// The table is cheap to clone, since the rules are shared.
#[derive(Debug, Clone)]
pub struct QuadratureTable<T> {
    degree: usize,
    rules: [Option<Arc<QuadratureRule<T>>>; 5],
}

impl<T: Real> QuadratureTable<T> {
    pub fn new(degree: usize) -> Self {
        Self {
            degree,
            rules: Default::default(),
        }
    }

    /// Creates a table holding rules for each of the given shapes.
    pub fn for_shapes(degree: usize, shapes: impl IntoIterator<Item = ReferenceCell>) -> Result<Self, FemError> {
        let mut table = Self::new(degree);
        for shape in shapes {
            table.insert(shape)?;
        }
        Ok(table)
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    fn insert(&mut self, shape: ReferenceCell) -> Result<Arc<QuadratureRule<T>>, FemError> {
        let index = shape_index(shape);
        if let Some(existing) = &self.rules[index] {
            return Ok(Arc::clone(existing));
        }
        let new_rule = Arc::new(rule(shape, self.degree)?);
        self.rules[index] = Some(Arc::clone(&new_rule));
        Ok(new_rule)
    }

    /// Returns the rule for the shape, computing it if it has not been requested before.
    pub fn rule_for(&mut self, shape: ReferenceCell) -> Result<Arc<QuadratureRule<T>>, FemError> {
        self.insert(shape)
    }

    /// Returns the rule for the shape if it has already been created.
    pub fn get(&self, shape: ReferenceCell) -> Option<&Arc<QuadratureRule<T>>> {
        self.rules[shape_index(shape)].as_ref()
    }
}

pub(crate) fn shape_index(shape: ReferenceCell) -> usize {
    match shape {
        ReferenceCell::Interval => 0,
        ReferenceCell::Triangle => 1,
        ReferenceCell::Quadrilateral => 2,
        ReferenceCell::Tetrahedron => 3,
        ReferenceCell::Hexahedron => 4,
    }
}
