//! Quadrature rules for quadrilaterals and hexahedra formed as tensor products of Gauss rules.

use crate::univariate::gauss;
use crate::{check_strength, gauss_points_for_degree, Error, Rule};

/// A Gauss rule for the reference quadrilateral `[-1, 1]^2` with `n` points per dimension.
///
/// The last coordinate varies fastest.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    let (weights1d, points1d) = gauss(num_points_per_dim);
    let n = weights1d.len();
    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);

    for (&wx, &[x]) in weights1d.iter().zip(&points1d) {
        for (&wy, &[y]) in weights1d.iter().zip(&points1d) {
            weights.push(wx * wy);
            points.push([x, y]);
        }
    }

    (weights, points)
}

/// A Gauss rule for the reference hexahedron `[-1, 1]^3` with `n` points per dimension.
///
/// The last coordinate varies fastest.
pub fn hexahedron_gauss(num_points_per_dim: usize) -> Rule<3> {
    let (weights1d, points1d) = gauss(num_points_per_dim);
    let n = weights1d.len();
    let mut weights = Vec::with_capacity(n * n * n);
    let mut points = Vec::with_capacity(n * n * n);

    for (&wx, &[x]) in weights1d.iter().zip(&points1d) {
        for (&wy, &[y]) in weights1d.iter().zip(&points1d) {
            for (&wz, &[z]) in weights1d.iter().zip(&points1d) {
                weights.push(wx * wy * wz);
                points.push([x, y, z]);
            }
        }
    }

    (weights, points)
}

/// A rule for the reference quadrilateral that integrates polynomials of total degree
/// `strength` exactly.
///
/// Tensor rules are exact for polynomials whose degree in *each* variable is bounded by
/// `strength`, which is a strictly larger space.
pub fn quadrilateral(strength: usize) -> Result<Rule<2>, Error> {
    check_strength(strength)?;
    Ok(quadrilateral_gauss(gauss_points_for_degree(strength)))
}

/// A rule for the reference hexahedron that integrates polynomials of total degree
/// `strength` exactly.
pub fn hexahedron(strength: usize) -> Result<Rule<3>, Error> {
    check_strength(strength)?;
    Ok(hexahedron_gauss(gauss_points_for_degree(strength)))
}
