//! Quadrature rules for finite element reference domains.
//!
//! All rules are computed in double precision and returned as plain arrays of points and
//! weights. Gauss rules are obtained from a symmetric eigenvalue problem solved with `nalgebra`.
//!
//! Reference domains:
//!
//! - Interval: `[0, 1]` (see [`simplex::interval`]). The Gauss rules in [`univariate`] use
//!   `[-1, 1]` instead.
//! - Triangle: the unit simplex with vertices `(0, 0)`, `(1, 0)`, `(0, 1)`.
//! - Tetrahedron: the unit simplex with vertices `(0, 0, 0)`, `(1, 0, 0)`, `(0, 1, 0)`,
//!   `(0, 0, 1)`.
//! - Quadrilateral: `[-1, 1]^2`.
//! - Hexahedron: `[-1, 1]^3`.
//!
//! Rules are identified by their *strength*: a rule of strength `k` integrates every
//! polynomial of total degree at most `k` exactly (up to round-off). Every rule is a pure
//! function of its arguments, so repeated requests produce bit-identical points and weights.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod simplex;
pub mod tensor;
pub mod univariate;

/// The largest strength for which rules are generated.
pub const MAX_STRENGTH: usize = 60;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that no rule of the requested strength is available.
    NoRuleAvailable { strength: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable { strength } => {
                write!(
                    f,
                    "no quadrature rule of strength {} is available (maximum strength is {})",
                    strength, MAX_STRENGTH
                )
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A two-dimensional point.
pub type Point2 = Point<2>;

/// A three-dimensional point.
pub type Point3 = Point<3>;

/// A D-dimensional rule, stored as `(weights, points)`.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional quadrature rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// A three-dimensional quadrature rule.
pub type Rule3d = Rule<3>;

/// Approximates the integral of `f` with the given rule.
pub fn integrate<const D: usize, F>(rule: &Rule<D>, mut f: F) -> f64
where
    F: FnMut(&Point<D>) -> f64,
{
    let (weights, points) = rule;
    assert_eq!(weights.len(), points.len(), "weights and points must have the same length");
    weights
        .iter()
        .zip(points)
        .map(|(w, x)| w * f(x))
        .sum()
}

/// Returns the smallest number of Gauss points that integrates univariate polynomials of the
/// given degree exactly.
pub(crate) fn gauss_points_for_degree(degree: usize) -> usize {
    // n Gauss points are exact for degree 2n - 1
    degree / 2 + 1
}

pub(crate) fn check_strength(strength: usize) -> Result<(), Error> {
    if strength > MAX_STRENGTH {
        Err(Error::NoRuleAvailable { strength })
    } else {
        Ok(())
    }
}
