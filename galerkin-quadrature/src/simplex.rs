//! Quadrature rules for the unit simplices in one, two and three dimensions.
//!
//! Low strengths use small tabulated rules. Higher strengths use the collapsed coordinate
//! (Duffy) construction: the simplex is the image of the unit cube under a polynomial map, and
//! the pulled-back integrand, including the Jacobian of the map, is integrated with a tensor
//! product of Gauss rules. The Jacobian adds powers of `(1 - u)` to the integrand, which is
//! accounted for by taking more points along the collapsed directions.

use crate::univariate::gauss_unit_interval;
use crate::{check_strength, gauss_points_for_degree, Error, Rule};

/// A rule for the unit interval `[0, 1]` of the given strength.
pub fn interval(strength: usize) -> Result<Rule<1>, Error> {
    check_strength(strength)?;
    Ok(gauss_unit_interval(gauss_points_for_degree(strength)))
}

/// A rule for the reference triangle with vertices `(0, 0)`, `(1, 0)`, `(0, 1)`.
pub fn triangle(strength: usize) -> Result<Rule<2>, Error> {
    check_strength(strength)?;
    match strength {
        0 | 1 => Ok((vec![0.5], vec![[1.0 / 3.0, 1.0 / 3.0]])),
        2 => {
            let w = 1.0 / 6.0;
            let a = 1.0 / 6.0;
            let b = 2.0 / 3.0;
            Ok((vec![w, w, w], vec![[a, a], [b, a], [a, b]]))
        }
        _ => Ok(collapsed_triangle(strength)),
    }
}

/// A rule for the reference tetrahedron with vertices `(0, 0, 0)`, `(1, 0, 0)`, `(0, 1, 0)`,
/// `(0, 0, 1)`.
pub fn tetrahedron(strength: usize) -> Result<Rule<3>, Error> {
    check_strength(strength)?;
    match strength {
        0 | 1 => Ok((vec![1.0 / 6.0], vec![[0.25, 0.25, 0.25]])),
        2 => {
            let w = 1.0 / 24.0;
            let a = 0.585_410_196_624_968_5;
            let b = 0.138_196_601_125_010_5;
            Ok((vec![w, w, w, w], vec![[b, b, b], [a, b, b], [b, a, b], [b, b, a]]))
        }
        _ => Ok(collapsed_tetrahedron(strength)),
    }
}

/// Collapsed rule on the triangle through `(u, v) -> (u, (1 - u) v)`, with Jacobian `1 - u`.
fn collapsed_triangle(strength: usize) -> Rule<2> {
    let (wu, pu) = gauss_unit_interval(gauss_points_for_degree(strength + 1));
    let (wv, pv) = gauss_unit_interval(gauss_points_for_degree(strength));

    let mut weights = Vec::with_capacity(wu.len() * wv.len());
    let mut points = Vec::with_capacity(wu.len() * wv.len());
    for (&w_u, &[u]) in wu.iter().zip(&pu) {
        let s = 1.0 - u;
        for (&w_v, &[v]) in wv.iter().zip(&pv) {
            weights.push(w_u * w_v * s);
            points.push([u, s * v]);
        }
    }
    (weights, points)
}

/// Collapsed rule on the tetrahedron through
/// `(u, v, w) -> (u, (1 - u) v, (1 - u)(1 - v) w)`, with Jacobian `(1 - u)^2 (1 - v)`.
fn collapsed_tetrahedron(strength: usize) -> Rule<3> {
    let (wu, pu) = gauss_unit_interval(gauss_points_for_degree(strength + 2));
    let (wv, pv) = gauss_unit_interval(gauss_points_for_degree(strength + 1));
    let (ww, pw) = gauss_unit_interval(gauss_points_for_degree(strength));

    let capacity = wu.len() * wv.len() * ww.len();
    let mut weights = Vec::with_capacity(capacity);
    let mut points = Vec::with_capacity(capacity);
    for (&w_u, &[u]) in wu.iter().zip(&pu) {
        let s = 1.0 - u;
        for (&w_v, &[v]) in wv.iter().zip(&pv) {
            let t = 1.0 - v;
            for (&w_w, &[w]) in ww.iter().zip(&pw) {
                weights.push(w_u * w_v * w_w * s * s * t);
                points.push([u, s * v, s * t * w]);
            }
        }
    }
    (weights, points)
}
