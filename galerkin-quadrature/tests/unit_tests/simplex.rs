use super::factorial;
use galerkin_quadrature::simplex::{interval, tetrahedron, triangle};
use galerkin_quadrature::{integrate, Error, MAX_STRENGTH};

use matrixcompare::assert_scalar_eq;

fn triangle_monomial_integral(a: usize, b: usize) -> f64 {
    factorial(a) * factorial(b) / factorial(a + b + 2)
}

fn tetrahedron_monomial_integral(a: usize, b: usize, c: usize) -> f64 {
    factorial(a) * factorial(b) * factorial(c) / factorial(a + b + c + 3)
}

#[test]
fn interval_rules_integrate_monomials_exactly() {
    for strength in 0..=20 {
        let rule = interval(strength).unwrap();
        for a in 0..=strength {
            let estimated = integrate(&rule, |&[x]| x.powi(a as i32));
            assert_scalar_eq!(estimated, 1.0 / (a as f64 + 1.0), comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn triangle_rules_integrate_monomials_exactly() {
    for strength in 0..=20 {
        let rule = triangle(strength).unwrap();
        assert!(rule.0.iter().all(|&w| w > 0.0));
        assert!(rule.1.iter().all(|&[x, y]| x >= 0.0 && y >= 0.0 && x + y <= 1.0));

        for a in 0..=strength {
            for b in 0..=(strength - a) {
                let estimated = integrate(&rule, |&[x, y]| x.powi(a as i32) * y.powi(b as i32));
                assert_scalar_eq!(estimated, triangle_monomial_integral(a, b), comp = abs, tol = 1e-14);
            }
        }
    }
}

#[test]
fn tetrahedron_rules_integrate_monomials_exactly() {
    for strength in 0..=12 {
        let rule = tetrahedron(strength).unwrap();
        assert!(rule.0.iter().all(|&w| w > 0.0));
        assert!(rule
            .1
            .iter()
            .all(|&[x, y, z]| x >= 0.0 && y >= 0.0 && z >= 0.0 && x + y + z <= 1.0));

        for a in 0..=strength {
            for b in 0..=(strength - a) {
                for c in 0..=(strength - a - b) {
                    let estimated = integrate(&rule, |&[x, y, z]| {
                        x.powi(a as i32) * y.powi(b as i32) * z.powi(c as i32)
                    });
                    assert_scalar_eq!(estimated, tetrahedron_monomial_integral(a, b, c), comp = abs, tol = 1e-14);
                }
            }
        }
    }
}

#[test]
fn rules_are_bit_identical_across_calls() {
    for strength in 0..=10 {
        assert_eq!(triangle(strength).unwrap(), triangle(strength).unwrap());
        assert_eq!(tetrahedron(strength).unwrap(), tetrahedron(strength).unwrap());
    }
}

#[test]
fn too_high_strength_is_rejected() {
    let strength = MAX_STRENGTH + 1;
    assert_eq!(triangle(strength), Err(Error::NoRuleAvailable { strength }));
    assert_eq!(tetrahedron(strength), Err(Error::NoRuleAvailable { strength }));
    assert!(interval(MAX_STRENGTH).is_ok());
}
