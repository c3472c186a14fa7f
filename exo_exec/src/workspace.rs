//! Workspace validation
//!
//! A configuration is checked, in order, against the donut workspace (task space only), the
//! subject's joint limits and finally the rig's linkage limits. The first check to fail gives the
//! classification.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exo_if::{
    ctrl::{Frame, WorkspaceStatus},
    geometry::{Geometry, JointLimits},
};
use nalgebra::Vector2;
use util::maths::wrap_to_pi;

use crate::{
    kinematics::{Kinematics, Linkage},
    params::RigParams,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The reachable workspace of one subject in the rig.
#[derive(Debug, Clone, Copy)]
pub struct Workspace {
    pub kin: Kinematics,
    pub linkage: Linkage,

    min_reach_m: f64,
    max_reach_m: f64,
    joint_limits: [JointLimits; 2],
    link_limits_rad: [f64; 2],
    elbow_max_rad: f64,
    eps_angle_rad: f64,
    eps_radius_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Workspace {
    pub fn new(geometry: &Geometry, rig: &RigParams) -> Self {
        Self {
            kin: Kinematics::new(geometry),
            linkage: Linkage::new(geometry, rig),
            min_reach_m: geometry.min_reach_m(),
            max_reach_m: geometry.max_reach_m(),
            joint_limits: geometry.limits(),
            link_limits_rad: rig.link_limits_rad(geometry.right_handed),
            elbow_max_rad: rig.elbow_max_rad,
            eps_angle_rad: rig.eps_angle_rad,
            eps_radius_m: rig.eps_radius_m,
        }
    }

    /// Classify a configuration given in the selected frame.
    pub fn check(&self, config: &Vector2<f64>, frame: Frame) -> WorkspaceStatus {
        let th_rad = match frame {
            Frame::Task => {
                let r = config.norm();

                if r <= self.min_reach_m {
                    return WorkspaceStatus::TooClose;
                }
                if r >= self.max_reach_m {
                    return WorkspaceStatus::TooFar;
                }

                self.kin.inverse_kin(config)
            }
            Frame::Joint => *config,
        };

        // Limits are expressed about zero, state angles live in [0, 2pi)
        let th_rad = th_rad.map(wrap_to_pi);

        if !self.joint_limits[0].contains(th_rad[0]) || !self.joint_limits[1].contains(th_rad[1])
        {
            return WorkspaceStatus::SubjectUnreachable;
        }

        let link_rad = self.linkage.joint_to_link(&th_rad);

        if th_rad[1] > self.elbow_max_rad
            || link_rad[0] > self.link_limits_rad[0] + self.eps_angle_rad
            || link_rad[1] < self.link_limits_rad[1] - self.eps_angle_rad
        {
            return WorkspaceStatus::RobotUnreachable;
        }

        WorkspaceStatus::InBounds
    }

    /// Project a task space point radially into the donut workspace.
    ///
    /// Points already inside the donut are returned unchanged. Joint limits are not considered.
    pub fn find_nearest_reachable(&self, pos_m: &Vector2<f64>) -> Vector2<f64> {
        let r_m = match self.check(pos_m, Frame::Task) {
            WorkspaceStatus::TooClose => self.min_reach_m + self.eps_radius_m,
            WorkspaceStatus::TooFar => self.max_reach_m - self.eps_radius_m,
            _ => return *pos_m,
        };

        let bearing_rad = pos_m[1].atan2(pos_m[0]);

        Vector2::new(r_m * bearing_rad.cos(), r_m * bearing_rad.sin())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::approx_eq;

    fn workspace(l1: f64, l2: f64) -> Workspace {
        let geometry = Geometry {
            upper_length_m: l1,
            to_ee_length_m: l2,
            ..Default::default()
        };

        Workspace::new(&geometry, &RigParams::default())
    }

    fn at_radius(r: f64, bearing: f64) -> Vector2<f64> {
        Vector2::new(r * bearing.cos(), r * bearing.sin())
    }

    fn is_donut_violation(s: WorkspaceStatus) -> bool {
        matches!(s, WorkspaceStatus::TooClose | WorkspaceStatus::TooFar)
    }

    #[test]
    fn test_donut_boundaries() {
        let ws = workspace(0.35, 0.3);
        let eps = 1e-6;

        for &bearing in &[0.3, 1.2, 2.0] {
            assert_eq!(
                ws.check(&at_radius(0.05 - eps, bearing), Frame::Task),
                WorkspaceStatus::TooClose
            );
            assert!(!is_donut_violation(
                ws.check(&at_radius(0.05 + eps, bearing), Frame::Task)
            ));
            assert!(!is_donut_violation(
                ws.check(&at_radius(0.65 - eps, bearing), Frame::Task)
            ));
            assert_eq!(
                ws.check(&at_radius(0.65 + eps, bearing), Frame::Task),
                WorkspaceStatus::TooFar
            );
        }
    }

    #[test]
    fn test_too_far_and_nearest() {
        let ws = workspace(0.3, 0.3);
        let bearing = 0.8;
        let p = at_radius(0.65, bearing);

        assert_eq!(ws.check(&p, Frame::Task), WorkspaceStatus::TooFar);

        let n = ws.find_nearest_reachable(&p);
        assert!(approx_eq(n.norm(), 0.6 - 0.05, 1e-12));
        assert!(approx_eq(n[1].atan2(n[0]), bearing, 1e-12));
    }

    #[test]
    fn test_nearest_too_close_and_inside() {
        let ws = workspace(0.35, 0.3);

        let n = ws.find_nearest_reachable(&at_radius(0.01, -0.5));
        assert!(approx_eq(n.norm(), 0.05 + 0.05, 1e-12));
        assert!(approx_eq(n[1].atan2(n[0]), -0.5, 1e-12));

        let inside = at_radius(0.4, 1.0);
        assert_eq!(ws.find_nearest_reachable(&inside), inside);
    }

    #[test]
    fn test_joint_space_limits() {
        let ws = workspace(0.3302, 0.3556);

        // Comfortably inside everything
        let ok = Vector2::new(30f64.to_radians(), 100f64.to_radians());
        assert_eq!(ws.check(&ok, Frame::Joint), WorkspaceStatus::InBounds);

        // Negative shoulder angles arrive wrapped into [0, 2pi)
        let wrapped = Vector2::new(
            (-10f64).to_radians().rem_euclid(std::f64::consts::TAU),
            130f64.to_radians(),
        );
        assert_eq!(ws.check(&wrapped, Frame::Joint), WorkspaceStatus::InBounds);

        // Beyond the subject's elbow
        let subj = Vector2::new(30f64.to_radians(), 175f64.to_radians());
        assert_eq!(ws.check(&subj, Frame::Joint), WorkspaceStatus::SubjectUnreachable);

        // Within the subject's limits but past the elbow hard stop
        let elbow = Vector2::new(0.0, 150f64.to_radians());
        assert_eq!(ws.check(&elbow, Frame::Joint), WorkspaceStatus::RobotUnreachable);

        // Shoulder past the linkage limit
        let shoulder = Vector2::new(100f64.to_radians(), 60f64.to_radians());
        assert_eq!(ws.check(&shoulder, Frame::Joint), WorkspaceStatus::RobotUnreachable);

        // Forearm folded onto the upper arm linkage
        let folded = Vector2::new(0.0, 20f64.to_radians());
        assert_eq!(ws.check(&folded, Frame::Joint), WorkspaceStatus::RobotUnreachable);
    }

    #[test]
    fn test_task_space_uses_joint_checks() {
        let ws = workspace(0.3302, 0.3556);
        let kin = ws.kin;

        let th = Vector2::new(30f64.to_radians(), 100f64.to_radians());
        let p = kin.forward_kin(&th);
        assert_eq!(ws.check(&p, Frame::Task), WorkspaceStatus::InBounds);

        // Behind the subject
        let behind = Vector2::new(0.0, -0.4);
        assert_eq!(ws.check(&behind, Frame::Task), WorkspaceStatus::SubjectUnreachable);
    }
}
