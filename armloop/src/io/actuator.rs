//! Actuation abstraction over the physics engine.
//!
//! The [`Actuator`] trait decouples plan execution from the simulator backend.
//! The bundled backend is [`crate::io::kinematic::KinematicArm`]; tests use a
//! recording arm that logs every call.

/// Failure reported by the actuation backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActuationError {
    /// The command was refused (e.g. unreachable target). Aborts the attempt only.
    #[error("actuation rejected: {0}")]
    Rejected(String),
    /// The simulator itself is broken or gone. Aborts the run.
    #[error("simulator unavailable: {0}")]
    Unavailable(String),
}

impl ActuationError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ActuationError::Unavailable(_))
    }
}

/// Pose queries, joint actuation and contact queries for one arm and its scene.
pub trait Actuator {
    /// Return the robot to its canonical starting configuration.
    fn reset(&mut self) -> Result<(), ActuationError>;

    /// Current end-effector position `[x, y, z]`.
    fn end_effector_position(&self) -> Result<[f64; 3], ActuationError>;

    /// Command an absolute end-effector target. Motion happens during [`Actuator::advance_time`].
    fn move_to(&mut self, target: [f64; 3]) -> Result<(), ActuationError>;

    /// Command a per-finger aperture (metres) with the given force (newtons).
    fn set_gripper(&mut self, aperture: f64, force: f64) -> Result<(), ActuationError>;

    /// Step the simulation forward.
    fn advance_time(&mut self, steps: u32) -> Result<(), ActuationError>;

    /// Height of the named object's base above the table.
    fn object_height(&self, object: &str) -> Result<f64, ActuationError>;

    /// Contact points between the robot and the named object.
    fn contact_count(&self, object: &str) -> Result<u32, ActuationError>;
}
