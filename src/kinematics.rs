//! Transverse-momentum kinematics for clusters and truth particles.
//!
//! Scalar helpers work on one object; the `*_expr` builders produce the same quantities as
//! polars expressions over frame columns.

use polars::prelude::*;

/// Transverse momentum of a massive object from its energy, mass and pseudorapidity:
/// `sqrt(E^2 - m^2) / cosh(eta)`.
///
/// `E < m` yields NaN.
pub fn pt_from_energy(e: f64, m: f64, eta: f64) -> f64 {
    (e * e - m * m).sqrt() / eta.cosh()
}

/// [`pt_from_energy`] as an expression.
pub fn pt_from_energy_expr(e: Expr, m: Expr, eta: Expr) -> Expr {
    (e.clone() * e - m.clone() * m).sqrt() / eta.cosh()
}

/// Transverse momentum of the vector `(pt, phi)` rebuilt from its Cartesian components,
/// `hypot(pt cos phi, pt sin phi)`.
pub fn transverse_momentum_expr(pt: Expr, phi: Expr) -> Expr {
    let px = pt.clone() * phi.clone().cos();
    let py = pt * phi.sin();
    (px.clone() * px + py.clone() * py).sqrt()
}

#[cfg(test)]
mod tests {
    use polars::prelude::*;

    use super::{pt_from_energy, pt_from_energy_expr, transverse_momentum_expr};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn pt_from_energy_at_central_eta() {
        assert_eq!(pt_from_energy(50_000.0, 0.0, 0.0), 50_000.0);
        let pt = pt_from_energy(10_000.0, 6_000.0, 0.0);
        assert!(close(pt, 8_000.0));
    }

    #[test]
    fn pt_from_energy_shrinks_with_eta() {
        let central = pt_from_energy(10_000.0, 0.0, 0.0);
        let forward = pt_from_energy(10_000.0, 0.0, 2.0);
        assert!(close(forward, central / 2.0_f64.cosh()));
    }

    #[test]
    fn pt_from_energy_below_mass_is_nan() {
        assert!(pt_from_energy(100.0, 200.0, 0.0).is_nan());
    }

    #[test]
    fn expressions_match_the_scalar_formulas() {
        let df = df!(
            "e" => [50_000.0f64, 80_000.0],
            "m" => [0.0f64, 2_000.0],
            "eta" => [0.0f64, 1.3],
            "phi" => [0.3f64, -2.1]
        )
        .unwrap();
        let out = df
            .lazy()
            .select([
                pt_from_energy_expr(col("e"), col("m"), col("eta")).alias("pt"),
                transverse_momentum_expr(lit(25_000.0), col("phi")).alias("rebuilt"),
            ])
            .collect()
            .unwrap();
        let pt: Vec<f64> = out.column("pt").unwrap().f64().unwrap().into_no_null_iter().collect();
        let rebuilt: Vec<f64> = out
            .column("rebuilt")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert!(close(pt[0], 50_000.0));
        assert!(close(pt[1], pt_from_energy(80_000.0, 2_000.0, 1.3)));
        assert!(rebuilt.iter().all(|&v| close(v, 25_000.0)));
    }
}
