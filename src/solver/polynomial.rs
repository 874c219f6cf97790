use crate::num::Number;

use std::f64::consts::PI;

/// Real roots of `c[0]·x³ + c[1]·x² + c[2]·x + c[3] = 0`.
///
/// Returns `None` when every coefficient is zero (any `x` is a root).
/// Lower-degree polynomials are solved when the leading coefficients vanish
/// exactly; a quadratic with a non-negative discriminant reports both roots,
/// repeated or not. A cubic reports one or three roots.
pub fn solve_cubic(coeffs: [Number; 4]) -> Option<Vec<Number>> {
    let [a0, a1, a2, a3] = coeffs;

    if a0 == 0.0 {
        if a1 == 0.0 {
            if a2 == 0.0 {
                return if a3 == 0.0 { None } else { Some(vec![]) };
            }
            return Some(vec![-a3 / a2]);
        }

        let d = a2 * a2 - 4.0 * a1 * a3;
        if d < 0.0 {
            return Some(vec![]);
        }
        let d = d.sqrt();
        let inv = 0.5 / a1;
        return Some(vec![(-a2 + d) * inv, (-a2 - d) * inv]);
    }

    // monic form
    let inv = 1.0 / a0;
    let (a1, a2, a3) = (a1 * inv, a2 * inv, a3 * inv);

    let q = (a1 * a1 - 3.0 * a2) / 9.0;
    let r = (2.0 * a1 * a1 * a1 - 9.0 * a1 * a2 + 27.0 * a3) / 54.0;
    let q_cubed = q * q * q;
    let d = q_cubed - r * r;
    let shift = a1 / 3.0;

    if d >= 0.0 {
        if q_cubed <= 0.0 {
            // triple root
            return Some(vec![-shift; 3]);
        }
        let theta = (r / q_cubed.sqrt()).clamp(-1.0, 1.0).acos() / 3.0;
        let t0 = -2.0 * q.sqrt();
        Some(vec![
            t0 * theta.cos() - shift,
            t0 * (theta + 2.0 * PI / 3.0).cos() - shift,
            t0 * (theta + 4.0 * PI / 3.0).cos() - shift,
        ])
    } else {
        let mut e = ((-d).sqrt() + r.abs()).cbrt();
        if r > 0.0 {
            e = -e;
        }
        Some(vec![e + q / e - shift])
    }
}
