//! Deterministic kinematic stand-in for the physics engine.
//!
//! Models a single arm over a table with one cube. The end effector moves
//! toward its commanded target at a bounded speed per simulation step; closing
//! the fingers near the cube with enough force attaches it, and an attached
//! cube follows the end effector until the fingers open. A released cube
//! lands on the table within the same step. No dynamics, no joint-space IK.
//!
//! The model produces success, `MISSED_GRASP` and `GRASP_SLIP` end to end. A
//! lifted cube is always held, so `UNSTABLE_LIFT` cannot arise here; that row
//! of the referee table is covered by the classifier tests.

use tracing::trace;

use crate::io::actuator::{ActuationError, Actuator};

/// Name under which the cube is addressable.
pub const CUBE: &str = "cube";

const HOME: [f64; 3] = [0.3, 0.0, 0.5];
const CUBE_HOME: [f64; 3] = [0.5, 0.0, CUBE_HALF_EXTENT];
const CUBE_HALF_EXTENT: f64 = 0.025;
const MAX_STEP_M: f64 = 0.005;
const GRASP_RADIUS_XY: f64 = 0.02;
const GRASP_TOLERANCE_Z: f64 = 0.03;
const MIN_GRIP_FORCE: f64 = 20.0;
const MAX_APERTURE: f64 = 0.04;
const REACH_M: f64 = 0.9;
const FINGER_CONTACTS: u32 = 2;

/// Single-arm, single-cube kinematic scene.
#[derive(Debug, Clone)]
pub struct KinematicArm {
    ee: [f64; 3],
    target: [f64; 3],
    aperture: f64,
    force: f64,
    cube: [f64; 3],
    grasped: bool,
}

impl Default for KinematicArm {
    fn default() -> Self {
        Self::new()
    }
}

impl KinematicArm {
    pub fn new() -> Self {
        Self {
            ee: HOME,
            target: HOME,
            aperture: MAX_APERTURE,
            force: 0.0,
            cube: CUBE_HOME,
            grasped: false,
        }
    }

    fn check_object(object: &str) -> Result<(), ActuationError> {
        if object == CUBE {
            Ok(())
        } else {
            Err(ActuationError::Unavailable(format!(
                "unknown object '{object}'"
            )))
        }
    }

    fn fingers_closed(&self) -> bool {
        self.aperture < CUBE_HALF_EXTENT
    }

    fn cube_between_fingers(&self) -> bool {
        let dx = self.ee[0] - self.cube[0];
        let dy = self.ee[1] - self.cube[1];
        let dz = self.ee[2] - self.cube[2];
        (dx * dx + dy * dy).sqrt() <= GRASP_RADIUS_XY && dz.abs() <= GRASP_TOLERANCE_Z
    }

    fn step_once(&mut self) {
        for axis in 0..3 {
            let delta = self.target[axis] - self.ee[axis];
            self.ee[axis] += delta.clamp(-MAX_STEP_M, MAX_STEP_M);
        }

        if self.grasped && !self.fingers_closed() {
            trace!("cube released");
            self.grasped = false;
        }
        if !self.grasped
            && self.fingers_closed()
            && self.force >= MIN_GRIP_FORCE
            && self.cube_between_fingers()
        {
            trace!("cube grasped");
            self.grasped = true;
        }

        if self.grasped {
            self.cube = self.ee;
        } else {
            self.cube[2] = CUBE_HALF_EXTENT;
        }
    }
}

impl Actuator for KinematicArm {
    fn reset(&mut self) -> Result<(), ActuationError> {
        // The cube stays where the last attempt left it; only the arm is homed.
        self.ee = HOME;
        self.target = HOME;
        self.aperture = MAX_APERTURE;
        self.force = 0.0;
        self.grasped = false;
        self.cube[2] = CUBE_HALF_EXTENT;
        Ok(())
    }

    fn end_effector_position(&self) -> Result<[f64; 3], ActuationError> {
        Ok(self.ee)
    }

    fn move_to(&mut self, target: [f64; 3]) -> Result<(), ActuationError> {
        if target.iter().any(|v| !v.is_finite()) {
            return Err(ActuationError::Rejected(format!(
                "non-finite target {target:?}"
            )));
        }
        let reach = target.iter().map(|v| v * v).sum::<f64>().sqrt();
        if reach > REACH_M {
            return Err(ActuationError::Rejected(format!(
                "target {target:?} outside reach ({reach:.3} m > {REACH_M} m)"
            )));
        }
        self.target = [target[0], target[1], target[2].max(0.0)];
        Ok(())
    }

    fn set_gripper(&mut self, aperture: f64, force: f64) -> Result<(), ActuationError> {
        self.aperture = aperture.clamp(0.0, MAX_APERTURE);
        self.force = force.max(0.0);
        Ok(())
    }

    fn advance_time(&mut self, steps: u32) -> Result<(), ActuationError> {
        for _ in 0..steps {
            self.step_once();
        }
        Ok(())
    }

    fn object_height(&self, object: &str) -> Result<f64, ActuationError> {
        Self::check_object(object)?;
        Ok(self.cube[2])
    }

    fn contact_count(&self, object: &str) -> Result<u32, ActuationError> {
        Self::check_object(object)?;
        if self.grasped || (self.fingers_closed() && self.cube_between_fingers()) {
            Ok(FINGER_CONTACTS)
        } else {
            Ok(0)
        }
    }
}
