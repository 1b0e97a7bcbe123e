//! Library-wide error type.
use crate::connectivity::ReferenceCell;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors reported by mesh construction, space construction, assembly and solves.
///
/// All errors are reported at the point of detection. None of them are recovered from
/// internally, since a malformed mesh or a singular geometry map invalidates every result
/// computed from it.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FemError {
    /// A cell or boundary specification refers to entities that do not exist or are malformed.
    Topology { message: String },
    /// The reference-to-physical map of a cell is non-positive or close to singular.
    DegenerateGeometry {
        /// The offending cell, if the geometry belongs to a mesh cell.
        cell: Option<usize>,
        /// The (signed) Jacobian determinant, or the metric measure for embedded cells.
        determinant: f64,
    },
    /// No quadrature rule or basis of the requested degree is available for the shape.
    UnsupportedDegree {
        shape: ReferenceCell,
        degree: usize,
    },
    /// A degree of freedom received two different Dirichlet values.
    InconsistentConstraint {
        dof: usize,
        existing: f64,
        prescribed: f64,
    },
    /// Sizes or dimensions of the provided data do not match.
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A linear system could not be solved, for example because its matrix is not positive
    /// definite.
    Solver { message: String },
}

impl FemError {
    pub(crate) fn topology(message: impl Into<String>) -> Self {
        Self::Topology {
            message: message.into(),
        }
    }

    /// Attaches a cell index to a geometry error that was detected without one.
    pub(crate) fn with_cell(self, cell_index: usize) -> Self {
        match self {
            Self::DegenerateGeometry { cell: None, determinant } => Self::DegenerateGeometry {
                cell: Some(cell_index),
                determinant,
            },
            other => other,
        }
    }
}

impl Display for FemError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topology { message } => write!(f, "topology error: {}", message),
            Self::DegenerateGeometry {
                cell: Some(cell),
                determinant,
            } => write!(
                f,
                "degenerate geometry in cell {}: Jacobian determinant {:e}",
                cell, determinant
            ),
            Self::DegenerateGeometry {
                cell: None,
                determinant,
            } => write!(f, "degenerate geometry: Jacobian determinant {:e}", determinant),
            Self::UnsupportedDegree { shape, degree } => {
                write!(f, "degree {} is not supported for shape {:?}", degree, shape)
            }
            Self::InconsistentConstraint {
                dof,
                existing,
                prescribed,
            } => write!(
                f,
                "inconsistent Dirichlet constraint on DOF {}: {} was already prescribed, got {}",
                dof, existing, prescribed
            ),
            Self::DimensionMismatch {
                context,
                expected,
                actual,
            } => write!(
                f,
                "dimension mismatch in {}: expected {}, got {}",
                context, expected, actual
            ),
            Self::Solver { message } => write!(f, "linear solver failed: {}", message),
        }
    }
}

impl std::error::Error for FemError {}

/// Converts a scalar to `f64` for error reporting.
pub(crate) fn to_f64<T: crate::Real>(value: T) -> f64 {
    value.to_subset().unwrap_or(f64::NAN)
}
