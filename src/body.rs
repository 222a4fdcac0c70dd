//! Rigid Bodies and Solve-Time Working Copies
//!
//! [`RigidBody`] is the array-of-structures entity owned by the surrounding
//! simulation; the solver reads and writes it by index. [`SolveBody`] is the
//! solver-owned working copy used by the structure-of-arrays paths: one
//! 16-byte record per body holding exactly the state the iteration loops
//! touch, so a body's whole hot state sits in a single aligned slot.

use crate::math::Vec2;

/// Rigid body state, as seen by the contact solver.
///
/// Positions are integrated by the caller; the solver mutates the linear and
/// angular velocities, the displacing (split-impulse) velocities, and the two
/// per-step iteration scratch counters.
#[derive(Clone, Copy, Debug)]
pub struct RigidBody {
    /// Position (center of mass)
    pub position: Vec2,
    /// Linear velocity
    pub velocity: Vec2,
    /// Angular velocity
    pub angular_velocity: f32,
    /// Displacing velocity for the positional-correction pass
    pub displacing_velocity: Vec2,
    /// Displacing angular velocity for the positional-correction pass
    pub displacing_angular_velocity: f32,
    /// Inverse mass (0 = static/infinite mass)
    pub inv_mass: f32,
    /// Inverse moment of inertia (0 = infinite)
    pub inv_inertia: f32,
    /// Last impulse iteration that produced a meaningful impulse on this body
    pub last_iteration: i32,
    /// Last displacement iteration that produced a meaningful impulse
    pub last_displacement_iteration: i32,
}

impl RigidBody {
    /// Create a dynamic body from mass and moment of inertia.
    #[must_use]
    pub fn new_dynamic(position: Vec2, mass: f32, inertia: f32) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            displacing_velocity: Vec2::ZERO,
            displacing_angular_velocity: 0.0,
            inv_mass: if mass > 0.0 { 1.0 / mass } else { 0.0 },
            inv_inertia: if inertia > 0.0 { 1.0 / inertia } else { 0.0 },
            last_iteration: -1,
            last_displacement_iteration: -1,
        }
    }

    /// Create a static (immovable) body.
    #[must_use]
    pub fn new_static(position: Vec2) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            displacing_velocity: Vec2::ZERO,
            displacing_angular_velocity: 0.0,
            inv_mass: 0.0,
            inv_inertia: 0.0,
            last_iteration: -1,
            last_displacement_iteration: -1,
        }
    }

    /// Check if the body is static (infinite mass).
    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.inv_mass == 0.0
    }

    /// Velocity of the world-space point at offset `delta` from the center.
    #[inline]
    #[must_use]
    pub fn velocity_at(&self, delta: Vec2) -> Vec2 {
        self.velocity + delta.perpendicular() * self.angular_velocity
    }
}

/// Solve-time working copy of one body's hot state.
///
/// The layout is a contract with the batched kernels: `velocity` at byte 0,
/// `angular_velocity` at byte 8, `last_iteration` at byte 12, 16 bytes total,
/// so four consecutive 32-bit loads fetch a whole body. Two arrays of these
/// exist per solve: one for the impulse pass, one for the displacement pass.
#[derive(Clone, Copy, Debug)]
#[repr(C, align(16))]
pub struct SolveBody {
    /// Linear velocity (impulse pass) or displacing velocity (displacement pass)
    pub velocity: Vec2,
    /// Angular velocity, or displacing angular velocity
    pub angular_velocity: f32,
    /// Last productive iteration index for this body, −1 initially
    pub last_iteration: i32,
}

const _: () = assert!(core::mem::size_of::<SolveBody>() == 16);
const _: () = assert!(core::mem::offset_of!(SolveBody, velocity) == 0);
const _: () = assert!(core::mem::offset_of!(SolveBody, angular_velocity) == 8);
const _: () = assert!(core::mem::offset_of!(SolveBody, last_iteration) == 12);

impl SolveBody {
    /// Working copy of a body's velocity state with the iteration counter reset.
    #[inline]
    #[must_use]
    pub fn from_velocity(velocity: Vec2, angular_velocity: f32) -> Self {
        Self {
            velocity,
            angular_velocity,
            last_iteration: -1,
        }
    }
}
