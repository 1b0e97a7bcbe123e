//! Quadrature rules for the one-dimensional domain `[-1, 1]`.

use crate::{check_strength, gauss_points_for_degree, Error, Rule};
use nalgebra::{DMatrix, SymmetricEigen};

/// Gauss-Legendre quadrature for the reference interval `[-1, 1]`.
///
/// Given `n` points, the rule integrates polynomials of degree up to `2n - 1` exactly.
/// Points are returned in increasing order.
///
/// The points are the eigenvalues of the symmetric tridiagonal Jacobi matrix of the Legendre
/// three-term recurrence, and the weights are `2 v_0^2` for the normalized eigenvectors `v`
/// (Golub-Welsch). The result is made exactly symmetric about the origin.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    // Off-diagonal k of the Jacobi matrix is k / sqrt(4k^2 - 1), the diagonal is zero
    let jacobi = DMatrix::from_fn(n, n, |i, j| {
        if i.abs_diff(j) == 1 {
            let k = i.max(j) as f64;
            k / (4.0 * k * k - 1.0).sqrt()
        } else {
            0.0
        }
    });
    let eigen = SymmetricEigen::new(jacobi);

    let mut nodes: Vec<(f64, f64)> = eigen
        .eigenvalues
        .iter()
        .zip(eigen.eigenvectors.column_iter())
        .map(|(&x, v)| (x, 2.0 * v[0] * v[0]))
        .collect();
    nodes.sort_by(|a, b| a.0.total_cmp(&b.0));

    for i in 0..n / 2 {
        let j = n - 1 - i;
        let x = 0.5 * (nodes[j].0 - nodes[i].0);
        let w = 0.5 * (nodes[i].1 + nodes[j].1);
        nodes[i] = (-x, w);
        nodes[j] = (x, w);
    }
    if n % 2 == 1 {
        nodes[n / 2].0 = 0.0;
    }

    nodes.into_iter().map(|(x, w)| (w, [x])).unzip()
}

/// Gauss-Legendre quadrature on `[-1, 1]` with the fewest points that integrate polynomials of
/// degree `strength` exactly.
pub fn gauss_for_strength(strength: usize) -> Result<Rule<1>, Error> {
    check_strength(strength)?;
    Ok(gauss(gauss_points_for_degree(strength)))
}

/// Gauss-Legendre quadrature with `n` points mapped to the unit interval `[0, 1]`.
pub fn gauss_unit_interval(num_points: usize) -> Rule<1> {
    let (weights, points) = gauss(num_points);
    let weights = weights.into_iter().map(|w| 0.5 * w).collect();
    let points = points.into_iter().map(|[x]| [0.5 * (x + 1.0)]).collect();
    (weights, points)
}
