use std::fmt::{self, Display, Formatter};
use tolerance::Tolerances;

use crate::MechanismErrors;

/// One joint anchor computed twice, once from each link's own geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorCheck {
    pub joint: String,
    pub link_a: String,
    pub link_b: String,
    pub residual: f64,
    pub tolerance: f64,
    pub passed: bool,
}

/// Every anchor coincidence check of a build, in the order the joints were derived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorReport {
    pub checks: Vec<AnchorCheck>,
}

impl AnchorReport {
    /// Records one anchor check. `scale` is the characteristic length the
    /// residual is judged against.
    pub fn record(
        &mut self,
        joint: &str,
        link_a: &str,
        link_b: &str,
        residual: f64,
        tolerances: &Tolerances,
        scale: f64,
    ) {
        let tolerance = tolerances.allowed(scale);
        let passed = tolerances.check_residual(residual, scale);
        tracing::debug!(
            "anchor check '{joint}' ({link_a} / {link_b}): residual {residual:.3e}, tolerance {tolerance:.3e}"
        );
        self.checks.push(AnchorCheck {
            joint: joint.to_string(),
            link_a: link_a.to_string(),
            link_b: link_b.to_string(),
            residual,
            tolerance,
            passed,
        });
    }

    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AnchorCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn max_residual(&self) -> f64 {
        self.checks.iter().map(|c| c.residual).fold(0.0, f64::max)
    }

    /// Fails on the first joint whose two anchor derivations disagree.
    pub fn assert_anchors_coincide(&self) -> Result<(), MechanismErrors> {
        match self.failures().next() {
            Some(c) => Err(MechanismErrors::InconsistentJointAnchor {
                joint: c.joint.clone(),
                link_a: c.link_a.clone(),
                link_b: c.link_b.clone(),
                residual: c.residual,
                tolerance: c.tolerance,
            }),
            None => Ok(()),
        }
    }
}

impl Display for AnchorReport {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(
            f,
            "{:<28} {:<24} {:<24} {:>12} {:>12}  result",
            "joint", "link a", "link b", "residual", "tolerance"
        )?;
        for c in &self.checks {
            writeln!(
                f,
                "{:<28} {:<24} {:<24} {:>12.3e} {:>12.3e}  {}",
                c.joint,
                c.link_a,
                c.link_b,
                c.residual,
                c.tolerance,
                if c.passed { "pass" } else { "FAIL" }
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_is_reported() {
        let tol = Tolerances::new(1e-6, 1e-9);
        let mut report = AnchorReport::default();
        report.record("hip", "chassis", "thigh", 1e-12, &tol, 0.1);
        report.record("knee", "thigh", "tibia", 2e-3, &tol, 0.1);
        report.record("ankle", "tibia", "foot", f64::NAN, &tol, 0.1);
        assert!(!report.all_passed());
        assert_eq!(report.failures().count(), 2);
        assert_eq!(report.checks[0].tolerance, tol.allowed(0.1));
        match report.assert_anchors_coincide() {
            Err(MechanismErrors::InconsistentJointAnchor {
                joint,
                link_a,
                link_b,
                residual,
                ..
            }) => {
                assert_eq!(joint, "knee");
                assert_eq!(link_a, "thigh");
                assert_eq!(link_b, "tibia");
                assert_eq!(residual, 2e-3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_display_has_one_line_per_check() {
        let mut report = AnchorReport::default();
        report.record("hip", "chassis", "thigh", 0.0, &Tolerances::default(), 0.3);
        assert_eq!(report.to_string().lines().count(), 2);
        assert!(report.assert_anchors_coincide().is_ok());
    }
}
