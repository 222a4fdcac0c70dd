//! Contact Joints and Constraint Rows
//!
//! A [`ContactJoint`] couples two bodies through a single contact point and
//! carries two 1-DOF constraint rows ([`Limiter`]): one along the contact
//! normal (non-penetration) and one along the tangent (Coulomb friction).
//! Each row stores Jacobian-like projector coefficients and precomputed
//! effective-mass terms so the iteration kernels are pure multiply-accumulate
//! work with no per-iteration geometry.
//!
//! `refresh` rebuilds the coefficients from the contact geometry and body
//! mass properties; `pre_step` applies the warm-start impulses carried over
//! from the previous step.

use crate::body::RigidBody;
use crate::math::Vec2;
use crate::solver::SolverConfig;

/// A single contact point between two bodies, produced by collision
/// detection.
///
/// Offsets are world-space deltas from each body's center of mass to the
/// contact point on that body's surface.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContactPoint {
    /// Offset from body 1's center to the contact point on body 1
    pub delta1: Vec2,
    /// Offset from body 2's center to the contact point on body 2
    pub delta2: Vec2,
    /// Unit contact normal, pointing in body 1's separation direction
    pub normal: Vec2,
}

impl ContactPoint {
    /// Build a contact point from world-space surface points and a normal.
    #[must_use]
    pub fn new(
        point1: Vec2,
        point2: Vec2,
        normal: Vec2,
        body1: &RigidBody,
        body2: &RigidBody,
    ) -> Self {
        Self {
            delta1: point1 - body1.position,
            delta2: point2 - body2.position,
            normal,
        }
    }
}

/// One 1-DOF constraint row: projectors, effective-mass terms, and
/// accumulated impulses.
///
/// The displacement-pass fields (`dst_displacing_velocity`,
/// `accumulated_displacing_impulse`) are only meaningful on the normal row;
/// they stay zero on the friction row.
#[derive(Clone, Copy, Debug, Default)]
pub struct Limiter {
    /// Linear projector for body 1
    pub normal_projector1: Vec2,
    /// Linear projector for body 2
    pub normal_projector2: Vec2,
    /// Angular projector for body 1
    pub angular_projector1: f32,
    /// Angular projector for body 2
    pub angular_projector2: f32,
    /// Body 1 linear velocity response per unit impulse
    pub comp_mass1_linear: Vec2,
    /// Body 2 linear velocity response per unit impulse
    pub comp_mass2_linear: Vec2,
    /// Body 1 angular velocity response per unit impulse
    pub comp_mass1_angular: f32,
    /// Body 2 angular velocity response per unit impulse
    pub comp_mass2_angular: f32,
    /// Inverse effective mass of the row (0 when both bodies are static)
    pub comp_inv_mass: f32,
    /// Accumulated impulse along this row
    pub accumulated_impulse: f32,
    /// Target velocity of the impulse pass (normal row only)
    pub dst_velocity: f32,
    /// Target velocity of the displacement pass (normal row only)
    pub dst_displacing_velocity: f32,
    /// Accumulated impulse of the displacement pass (normal row only)
    pub accumulated_displacing_impulse: f32,
}

impl Limiter {
    /// Rebuild projectors and effective-mass terms for the given axis.
    ///
    /// Accumulated impulses are left untouched; whatever the previous step
    /// accumulated is the warm-start state.
    fn refresh(
        &mut self,
        projector1: Vec2,
        projector2: Vec2,
        angular1: f32,
        angular2: f32,
        body1: &RigidBody,
        body2: &RigidBody,
    ) {
        self.normal_projector1 = projector1;
        self.normal_projector2 = projector2;
        self.angular_projector1 = angular1;
        self.angular_projector2 = angular2;

        self.comp_mass1_linear = projector1 * body1.inv_mass;
        self.comp_mass2_linear = projector2 * body2.inv_mass;
        self.comp_mass1_angular = angular1 * body1.inv_inertia;
        self.comp_mass2_angular = angular2 * body2.inv_inertia;

        let comp_mass1 =
            projector1.length_squared() * body1.inv_mass + angular1 * angular1 * body1.inv_inertia;
        let comp_mass2 =
            projector2.length_squared() * body2.inv_mass + angular2 * angular2 * body2.inv_inertia;
        let comp_mass = comp_mass1 + comp_mass2;

        self.comp_inv_mass = if comp_mass > f32::EPSILON {
            1.0 / comp_mass
        } else {
            0.0
        };
    }

    /// Apply an impulse along this row to both bodies' velocities.
    #[inline]
    fn apply_impulse(&self, impulse: f32, body1: &mut RigidBody, body2: &mut RigidBody) {
        body1.velocity += self.comp_mass1_linear * impulse;
        body1.angular_velocity += self.comp_mass1_angular * impulse;
        body2.velocity += self.comp_mass2_linear * impulse;
        body2.angular_velocity += self.comp_mass2_angular * impulse;
    }
}

/// Contact constraint between two bodies: a normal row and a friction row.
#[derive(Clone, Copy, Debug)]
pub struct ContactJoint {
    /// Index of the first body
    pub body1_index: u32,
    /// Index of the second body
    pub body2_index: u32,
    /// Contact geometry this joint was built from
    pub contact: ContactPoint,
    /// Non-penetration row; impulse clamped to be non-negative
    pub normal_limiter: Limiter,
    /// Tangential row; impulse clamped to the Coulomb cone
    pub friction_limiter: Limiter,
}

impl ContactJoint {
    /// Create a joint with zeroed rows; call `refresh` before solving.
    #[must_use]
    pub fn new(body1_index: u32, body2_index: u32, contact: ContactPoint) -> Self {
        Self {
            body1_index,
            body2_index,
            contact,
            normal_limiter: Limiter::default(),
            friction_limiter: Limiter::default(),
        }
    }

    /// Rebuild both rows' coefficients and velocity targets from the contact
    /// geometry and current body state.
    ///
    /// Pure per-joint work: reads the two bodies, writes only this joint.
    pub fn refresh(&mut self, body1: &RigidBody, body2: &RigidBody, config: &SolverConfig) {
        let n = self.contact.normal;
        let t = n.perpendicular();

        self.normal_limiter.refresh(
            n,
            -n,
            self.contact.delta1.cross(n),
            -self.contact.delta2.cross(n),
            body1,
            body2,
        );

        self.friction_limiter.refresh(
            t,
            -t,
            self.contact.delta1.cross(t),
            -self.contact.delta2.cross(t),
            body1,
            body2,
        );

        let w1 = body1.position + self.contact.delta1;
        let w2 = body2.position + self.contact.delta2;
        let depth = (w2 - w1).dot(n);

        // Restitution is baked into the impulse-pass target; the displacement
        // pass bleeds off penetration beyond the slop.
        let separation_velocity = (body1.velocity_at(self.contact.delta1)
            - body2.velocity_at(self.contact.delta2))
        .dot(n);

        self.normal_limiter.dst_velocity = if separation_velocity < 0.0 {
            -config.restitution * separation_velocity
        } else {
            0.0
        };

        self.normal_limiter.dst_displacing_velocity =
            (depth - config.contact_slop).max(0.0) * config.displacement_bias;
    }

    /// Warm start: apply the accumulated impulses carried over from the last
    /// step to the bodies' velocities.
    ///
    /// The displacement accumulator is not warm-started; it resets here.
    pub fn pre_step(&mut self, body1: &mut RigidBody, body2: &mut RigidBody) {
        self.normal_limiter
            .apply_impulse(self.normal_limiter.accumulated_impulse, body1, body2);
        self.friction_limiter
            .apply_impulse(self.friction_limiter.accumulated_impulse, body1, body2);

        self.normal_limiter.accumulated_displacing_impulse = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_body(position: Vec2) -> RigidBody {
        RigidBody::new_dynamic(position, 1.0, 1.0)
    }

    #[test]
    fn test_refresh_projectors_head_on() {
        // Two unit bodies stacked along y, contact at the origin.
        let body1 = unit_body(Vec2::new(0.0, 0.5));
        let body2 = unit_body(Vec2::new(0.0, -0.5));
        let contact = ContactPoint::new(Vec2::ZERO, Vec2::ZERO, Vec2::UNIT_Y, &body1, &body2);
        let mut joint = ContactJoint::new(0, 1, contact);
        joint.refresh(&body1, &body2, &SolverConfig::default());

        let nl = &joint.normal_limiter;
        assert_eq!(nl.normal_projector1, Vec2::UNIT_Y);
        assert_eq!(nl.normal_projector2, -Vec2::UNIT_Y);
        // delta is parallel to the normal, so no angular coupling
        assert_eq!(nl.angular_projector1, 0.0);
        assert_eq!(nl.angular_projector2, 0.0);
        // Two unit masses along a unit axis: effective mass 2
        assert!((nl.comp_inv_mass - 0.5).abs() < 1e-6);

        let fl = &joint.friction_limiter;
        assert_eq!(fl.normal_projector1, Vec2::new(-1.0, 0.0));
        assert_eq!(fl.normal_projector2, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_refresh_static_pair_has_zero_inv_mass() {
        let body1 = RigidBody::new_static(Vec2::ZERO);
        let body2 = RigidBody::new_static(Vec2::new(0.0, -1.0));
        let contact = ContactPoint::new(Vec2::ZERO, Vec2::ZERO, Vec2::UNIT_Y, &body1, &body2);
        let mut joint = ContactJoint::new(0, 1, contact);
        joint.refresh(&body1, &body2, &SolverConfig::default());
        assert_eq!(joint.normal_limiter.comp_inv_mass, 0.0);
        assert_eq!(joint.friction_limiter.comp_inv_mass, 0.0);
    }

    #[test]
    fn test_displacement_target_from_depth() {
        let config = SolverConfig {
            contact_slop: 0.01,
            displacement_bias: 0.2,
            ..Default::default()
        };
        // Body 1's surface point sits 0.11 below body 2's along the normal.
        let body1 = unit_body(Vec2::new(0.0, 0.5));
        let body2 = unit_body(Vec2::new(0.0, -0.5));
        let contact = ContactPoint::new(
            Vec2::new(0.0, -0.055),
            Vec2::new(0.0, 0.055),
            Vec2::UNIT_Y,
            &body1,
            &body2,
        );
        let mut joint = ContactJoint::new(0, 1, contact);
        joint.refresh(&body1, &body2, &config);
        let expected = (0.11 - 0.01) * 0.2;
        assert!((joint.normal_limiter.dst_displacing_velocity - expected).abs() < 1e-6);
    }

    #[test]
    fn test_restitution_bakes_into_target() {
        let config = SolverConfig {
            restitution: 0.5,
            ..Default::default()
        };
        let mut body1 = unit_body(Vec2::new(0.0, 0.5));
        let body2 = unit_body(Vec2::new(0.0, -0.5));
        body1.velocity = Vec2::new(0.0, -2.0); // approaching body 2
        let contact = ContactPoint::new(Vec2::ZERO, Vec2::ZERO, Vec2::UNIT_Y, &body1, &body2);
        let mut joint = ContactJoint::new(0, 1, contact);
        joint.refresh(&body1, &body2, &config);
        assert!((joint.normal_limiter.dst_velocity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pre_step_applies_warm_start() {
        let mut body1 = unit_body(Vec2::new(0.0, 0.5));
        let mut body2 = unit_body(Vec2::new(0.0, -0.5));
        let contact = ContactPoint::new(Vec2::ZERO, Vec2::ZERO, Vec2::UNIT_Y, &body1, &body2);
        let mut joint = ContactJoint::new(0, 1, contact);
        joint.refresh(&body1, &body2, &SolverConfig::default());

        joint.normal_limiter.accumulated_impulse = 2.0;
        joint.normal_limiter.accumulated_displacing_impulse = 0.7;
        joint.pre_step(&mut body1, &mut body2);

        // Unit masses: impulse transfers directly into velocity along +/- n
        assert_eq!(body1.velocity, Vec2::new(0.0, 2.0));
        assert_eq!(body2.velocity, Vec2::new(0.0, -2.0));
        // Displacement accumulator is not carried across steps
        assert_eq!(joint.normal_limiter.accumulated_displacing_impulse, 0.0);
    }
}
