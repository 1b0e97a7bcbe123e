//! Assembly of local element contributions into global sparse linear systems.
//!
//! The usual entry point is [`global::SystemAssembler`], which combines a bilinear kernel, a
//! linear kernel and [`boundary::BoundaryConditions`] into a [`global::GlobalSystem`].
use crate::element::GeometrySettings;
use serde::{Deserialize, Serialize};

pub mod boundary;
mod buffers;
pub mod global;
pub mod local;
pub mod operators;

/// How Dirichlet constraints are imposed on an assembled system.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum DirichletStrategy {
    /// Zero constrained rows and columns, put ones on the diagonal and move the eliminated
    /// column entries to the right-hand side. Preserves symmetry.
    #[default]
    SymmetricElimination,
    /// Replace constrained rows by identity rows.
    RowElimination,
    /// Add `factor` times the largest diagonal entry to constrained diagonal entries.
    Penalty { factor: f64 },
}

/// Settings shared by the local and global assemblers.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblySettings {
    /// Strength of the quadrature rules. If `None`, the strength is derived from the integrand
    /// degree reported by each kernel.
    pub quadrature_degree: Option<usize>,
    /// Compute element contributions on the rayon thread pool.
    pub parallel: bool,
    pub dirichlet: DirichletStrategy,
    /// Largest absolute difference tolerated between two Dirichlet values for the same DOF.
    pub constraint_tolerance: f64,
    pub geometry: GeometrySettings,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            quadrature_degree: None,
            parallel: false,
            dirichlet: DirichletStrategy::default(),
            constraint_tolerance: 1e-10,
            geometry: GeometrySettings::default(),
        }
    }
}
