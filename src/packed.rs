//! Packed Structure-of-Arrays Joint Batches
//!
//! [`ContactJointPacked`] is the unit of vectorized work: a block of `N`
//! joints transposed into parallel lanes, one array per scalar field, so an
//! N-wide kernel loads a field for N joints with a single contiguous read.
//! Blocks are 64-byte aligned, which covers the widest path in use (16 lanes
//! processed as two 8-wide banks).
//!
//! Blocks are rebuilt from the joint list on every solve; only the
//! accumulated impulses are gathered back afterwards, since everything else
//! is derived state owned by the joint refresh.

use crate::joint::ContactJoint;

/// One constraint row transposed into `N` parallel lanes.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct PackedLimiter<const N: usize> {
    /// Body 1 linear projector, X lanes
    pub normal_projector1_x: [f32; N],
    /// Body 1 linear projector, Y lanes
    pub normal_projector1_y: [f32; N],
    /// Body 2 linear projector, X lanes
    pub normal_projector2_x: [f32; N],
    /// Body 2 linear projector, Y lanes
    pub normal_projector2_y: [f32; N],
    /// Body 1 angular projector lanes
    pub angular_projector1: [f32; N],
    /// Body 2 angular projector lanes
    pub angular_projector2: [f32; N],
    /// Body 1 linear response, X lanes
    pub comp_mass1_linear_x: [f32; N],
    /// Body 1 linear response, Y lanes
    pub comp_mass1_linear_y: [f32; N],
    /// Body 2 linear response, X lanes
    pub comp_mass2_linear_x: [f32; N],
    /// Body 2 linear response, Y lanes
    pub comp_mass2_linear_y: [f32; N],
    /// Body 1 angular response lanes
    pub comp_mass1_angular: [f32; N],
    /// Body 2 angular response lanes
    pub comp_mass2_angular: [f32; N],
    /// Inverse effective mass lanes
    pub comp_inv_mass: [f32; N],
    /// Accumulated impulse lanes
    pub accumulated_impulse: [f32; N],
}

impl<const N: usize> PackedLimiter<N> {
    fn zeroed() -> Self {
        Self {
            normal_projector1_x: [0.0; N],
            normal_projector1_y: [0.0; N],
            normal_projector2_x: [0.0; N],
            normal_projector2_y: [0.0; N],
            angular_projector1: [0.0; N],
            angular_projector2: [0.0; N],
            comp_mass1_linear_x: [0.0; N],
            comp_mass1_linear_y: [0.0; N],
            comp_mass2_linear_x: [0.0; N],
            comp_mass2_linear_y: [0.0; N],
            comp_mass1_angular: [0.0; N],
            comp_mass2_angular: [0.0; N],
            comp_inv_mass: [0.0; N],
            accumulated_impulse: [0.0; N],
        }
    }
}

/// A block of `N` joints in structure-of-arrays layout.
///
/// Body index lanes are 32-bit unsigned; the index space must fit the body
/// array handed to the solve entry points.
#[derive(Clone, Copy, Debug)]
#[repr(C, align(64))]
pub struct ContactJointPacked<const N: usize> {
    /// Body 1 index lanes
    pub body1_index: [u32; N],
    /// Body 2 index lanes
    pub body2_index: [u32; N],
    /// Non-penetration row lanes
    pub normal_limiter: PackedLimiter<N>,
    /// Impulse-pass target velocity lanes (normal row)
    pub normal_dst_velocity: [f32; N],
    /// Displacement-pass target velocity lanes (normal row)
    pub normal_dst_displacing_velocity: [f32; N],
    /// Displacement-pass accumulated impulse lanes (normal row)
    pub normal_accumulated_displacing_impulse: [f32; N],
    /// Friction row lanes
    pub friction_limiter: PackedLimiter<N>,
}

impl<const N: usize> ContactJointPacked<N> {
    /// An all-zero block. Unused trailing lanes of a partially filled block
    /// stay in this state; zero `comp_inv_mass` makes them inert.
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            body1_index: [0; N],
            body2_index: [0; N],
            normal_limiter: PackedLimiter::zeroed(),
            normal_dst_velocity: [0.0; N],
            normal_dst_displacing_velocity: [0.0; N],
            normal_accumulated_displacing_impulse: [0.0; N],
            friction_limiter: PackedLimiter::zeroed(),
        }
    }

    /// Scatter one joint's scalar fields into lane `lane`.
    pub fn write_lane(&mut self, lane: usize, joint: &ContactJoint) {
        self.body1_index[lane] = joint.body1_index;
        self.body2_index[lane] = joint.body2_index;

        let nl = &joint.normal_limiter;
        self.normal_limiter.normal_projector1_x[lane] = nl.normal_projector1.x;
        self.normal_limiter.normal_projector1_y[lane] = nl.normal_projector1.y;
        self.normal_limiter.normal_projector2_x[lane] = nl.normal_projector2.x;
        self.normal_limiter.normal_projector2_y[lane] = nl.normal_projector2.y;
        self.normal_limiter.angular_projector1[lane] = nl.angular_projector1;
        self.normal_limiter.angular_projector2[lane] = nl.angular_projector2;
        self.normal_limiter.comp_mass1_linear_x[lane] = nl.comp_mass1_linear.x;
        self.normal_limiter.comp_mass1_linear_y[lane] = nl.comp_mass1_linear.y;
        self.normal_limiter.comp_mass2_linear_x[lane] = nl.comp_mass2_linear.x;
        self.normal_limiter.comp_mass2_linear_y[lane] = nl.comp_mass2_linear.y;
        self.normal_limiter.comp_mass1_angular[lane] = nl.comp_mass1_angular;
        self.normal_limiter.comp_mass2_angular[lane] = nl.comp_mass2_angular;
        self.normal_limiter.comp_inv_mass[lane] = nl.comp_inv_mass;
        self.normal_limiter.accumulated_impulse[lane] = nl.accumulated_impulse;
        self.normal_dst_velocity[lane] = nl.dst_velocity;
        self.normal_dst_displacing_velocity[lane] = nl.dst_displacing_velocity;
        self.normal_accumulated_displacing_impulse[lane] = nl.accumulated_displacing_impulse;

        let fl = &joint.friction_limiter;
        self.friction_limiter.normal_projector1_x[lane] = fl.normal_projector1.x;
        self.friction_limiter.normal_projector1_y[lane] = fl.normal_projector1.y;
        self.friction_limiter.normal_projector2_x[lane] = fl.normal_projector2.x;
        self.friction_limiter.normal_projector2_y[lane] = fl.normal_projector2.y;
        self.friction_limiter.angular_projector1[lane] = fl.angular_projector1;
        self.friction_limiter.angular_projector2[lane] = fl.angular_projector2;
        self.friction_limiter.comp_mass1_linear_x[lane] = fl.comp_mass1_linear.x;
        self.friction_limiter.comp_mass1_linear_y[lane] = fl.comp_mass1_linear.y;
        self.friction_limiter.comp_mass2_linear_x[lane] = fl.comp_mass2_linear.x;
        self.friction_limiter.comp_mass2_linear_y[lane] = fl.comp_mass2_linear.y;
        self.friction_limiter.comp_mass1_angular[lane] = fl.comp_mass1_angular;
        self.friction_limiter.comp_mass2_angular[lane] = fl.comp_mass2_angular;
        self.friction_limiter.comp_inv_mass[lane] = fl.comp_inv_mass;
        self.friction_limiter.accumulated_impulse[lane] = fl.accumulated_impulse;
    }

    /// Gather the accumulated impulses of lane `lane` back into a joint.
    ///
    /// Projector and mass lanes are not written back; they are derived by the
    /// next refresh.
    pub fn read_lane_impulses(&self, lane: usize, joint: &mut ContactJoint) {
        joint.normal_limiter.accumulated_impulse = self.normal_limiter.accumulated_impulse[lane];
        joint.normal_limiter.accumulated_displacing_impulse =
            self.normal_accumulated_displacing_impulse[lane];
        joint.friction_limiter.accumulated_impulse =
            self.friction_limiter.accumulated_impulse[lane];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use crate::joint::ContactPoint;
    use crate::math::Vec2;
    use crate::solver::SolverConfig;

    fn sample_joint(seed: f32) -> ContactJoint {
        let body1 = RigidBody::new_dynamic(Vec2::new(0.0, seed), 1.0, 2.0);
        let body2 = RigidBody::new_dynamic(Vec2::new(seed, -1.0), 3.0, 1.0);
        let contact = ContactPoint::new(
            Vec2::new(0.1 * seed, 0.0),
            Vec2::new(0.0, 0.2),
            Vec2::UNIT_Y,
            &body1,
            &body2,
        );
        let mut joint = ContactJoint::new(4, 9, contact);
        joint.refresh(&body1, &body2, &SolverConfig::default());
        joint.normal_limiter.accumulated_impulse = 0.25 * seed;
        joint.friction_limiter.accumulated_impulse = -0.125 * seed;
        joint.normal_limiter.accumulated_displacing_impulse = 0.0625 * seed;
        joint
    }

    #[test]
    fn test_alignment_and_lane_layout() {
        assert_eq!(core::mem::align_of::<ContactJointPacked<4>>(), 64);
        assert_eq!(core::mem::align_of::<ContactJointPacked<16>>(), 64);
        // Field lanes are contiguous per field, N floats each
        assert_eq!(
            core::mem::size_of::<PackedLimiter<8>>(),
            14 * 8 * core::mem::size_of::<f32>()
        );
    }

    #[test]
    fn test_write_read_lane() {
        let mut packed = ContactJointPacked::<4>::zeroed();
        let joint = sample_joint(2.0);
        packed.write_lane(3, &joint);

        assert_eq!(packed.body1_index[3], 4);
        assert_eq!(packed.body2_index[3], 9);
        assert_eq!(
            packed.normal_limiter.comp_inv_mass[3],
            joint.normal_limiter.comp_inv_mass
        );
        assert_eq!(
            packed.friction_limiter.normal_projector1_x[3],
            joint.friction_limiter.normal_projector1.x
        );
        // Other lanes untouched
        assert_eq!(packed.normal_limiter.comp_inv_mass[0], 0.0);

        let mut out = sample_joint(0.0);
        packed.read_lane_impulses(3, &mut out);
        assert_eq!(
            out.normal_limiter.accumulated_impulse,
            joint.normal_limiter.accumulated_impulse
        );
        assert_eq!(
            out.friction_limiter.accumulated_impulse,
            joint.friction_limiter.accumulated_impulse
        );
        assert_eq!(
            out.normal_limiter.accumulated_displacing_impulse,
            joint.normal_limiter.accumulated_displacing_impulse
        );
    }

    #[test]
    fn test_zeroed_lanes_are_inert() {
        let packed = ContactJointPacked::<8>::zeroed();
        for lane in 0..8 {
            assert_eq!(packed.normal_limiter.comp_inv_mass[lane], 0.0);
            assert_eq!(packed.friction_limiter.comp_inv_mass[lane], 0.0);
        }
    }
}
