//! Sequential Impulse Contact Solver
//!
//! Projected Gauss–Seidel solver with two iteration loops: an impulse pass
//! over linear/angular velocities and a displacement pass over the
//! split-impulse displacing velocities. Four behavioral variants share one
//! algorithm:
//!
//! - `solve_joints_aos`: scalar loop over the joint list, touching
//!   [`RigidBody`] state directly through the stored body indices.
//! - `solve_joints_soa_scalar`: same math over the packed
//!   structure-of-arrays batches, one lane at a time.
//! - `solve_joints_soa_simd4` / `solve_joints_soa_simd8`: lane-width-generic
//!   kernel over 4- or 8-wide batches.
//! - `solve_joints_soa_fma`: 16-wide batches processed as two interleaved
//!   8-wide banks using fused multiply-add.
//!
//! # Batching
//!
//! The wide kernels update both endpoint bodies of every lane in a batch
//! without any synchronization. That is only sound because of the grouping
//! invariant produced by `solve_prepare_indices`: within each group of N
//! consecutive packed joints, the 2·N referenced bodies are pairwise
//! distinct. Joints that cannot be grouped form a tail past the group
//! boundary and are always solved by the one-lane kernel.
//!
//! # Early exit
//!
//! Bodies carry the index of the last iteration that applied a meaningful
//! impulse to them. A joint whose endpoints were both quiet in the previous
//! iteration is skipped; a full sweep that applies no meaningful impulse
//! anywhere ends the pass early.

use crate::body::{RigidBody, SolveBody};
use crate::error::SolverError;
use crate::joint::ContactJoint;
use crate::packed::ContactJointPacked;
use crate::profiling::SolverStats;
use crate::simd::{WideF32, WideI32};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Joints per parallel refresh chunk.
#[cfg(feature = "parallel")]
const REFRESH_CHUNK: usize = 8;

/// Solver tuning parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverConfig {
    /// Coulomb friction coefficient μ; friction impulses are clamped to
    /// `|λ_f| <= μ · λ_n`
    pub friction_coefficient: f32,
    /// Impulse magnitude below which an update does not count as productive
    pub productive_impulse: f32,
    /// Restitution baked into the impulse-pass velocity target
    pub restitution: f32,
    /// Penetration depth tolerated before the displacement pass reacts
    pub contact_slop: f32,
    /// Fraction of the remaining penetration fed into the displacement
    /// target each step
    pub displacement_bias: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            friction_coefficient: 0.3,
            productive_impulse: 1e-4,
            restitution: 0.0,
            contact_slop: 0.01,
            displacement_bias: 0.2,
        }
    }
}

/// Contact constraint solver.
///
/// Owns the joint list and all solve-time scratch: the per-pass body working
/// arrays, the joint permutation produced by grouping, and one packed batch
/// array per supported lane width.
#[derive(Clone, Debug)]
pub struct Solver {
    /// Tuning parameters
    pub config: SolverConfig,
    /// All contact joints; rebuilt by the surrounding simulation each step
    pub contact_joints: Vec<ContactJoint>,

    solve_bodies_impulse: Vec<SolveBody>,
    solve_bodies_displacement: Vec<SolveBody>,

    joint_group_bodies: Vec<i32>,
    joint_group_joints: Vec<u32>,
    joint_index: Vec<u32>,

    joint_packed4: Vec<ContactJointPacked<4>>,
    joint_packed8: Vec<ContactJointPacked<8>>,
    joint_packed16: Vec<ContactJointPacked<16>>,

    stats: SolverStats,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

impl Solver {
    /// Create a solver with the given configuration.
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            contact_joints: Vec::new(),
            solve_bodies_impulse: Vec::new(),
            solve_bodies_displacement: Vec::new(),
            joint_group_bodies: Vec::new(),
            joint_group_joints: Vec::new(),
            joint_index: Vec::new(),
            joint_packed4: Vec::new(),
            joint_packed8: Vec::new(),
            joint_packed16: Vec::new(),
            stats: SolverStats::default(),
        }
    }

    /// Accumulated pipeline counters.
    #[must_use]
    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    /// Reset the pipeline counters.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Add a contact joint after validating its body references.
    pub fn add_joint(
        &mut self,
        bodies: &[RigidBody],
        joint: ContactJoint,
    ) -> Result<(), SolverError> {
        for index in [joint.body1_index, joint.body2_index] {
            if index as usize >= bodies.len() {
                return Err(SolverError::InvalidBodyIndex {
                    index,
                    count: bodies.len(),
                });
            }
        }
        if joint.body1_index == joint.body2_index {
            return Err(SolverError::InvalidJoint {
                reason: "joint endpoints must be distinct bodies",
            });
        }
        self.contact_joints.push(joint);
        Ok(())
    }

    /// Rebuild every joint's projectors, effective masses, and velocity
    /// targets from current body state. Pure per-joint work.
    pub fn refresh_joints(&mut self, bodies: &[RigidBody]) {
        let config = self.config;
        for joint in &mut self.contact_joints {
            let body1 = &bodies[joint.body1_index as usize];
            let body2 = &bodies[joint.body2_index as usize];
            joint.refresh(body1, body2, &config);
        }
    }

    /// Parallel joint refresh over chunks of 8 joints.
    ///
    /// Produces exactly the same joint data as [`Solver::refresh_joints`]
    /// regardless of scheduling; refresh reads bodies and writes only its own
    /// joint.
    #[cfg(feature = "parallel")]
    pub fn refresh_joints_parallel(&mut self, bodies: &[RigidBody]) {
        let config = self.config;
        self.contact_joints
            .par_chunks_mut(REFRESH_CHUNK)
            .for_each(|chunk| {
                for joint in chunk {
                    let body1 = &bodies[joint.body1_index as usize];
                    let body2 = &bodies[joint.body2_index as usize];
                    joint.refresh(body1, body2, &config);
                }
            });
    }

    /// Apply warm-start impulses carried over from the previous step.
    pub fn pre_step_joints(&mut self, bodies: &mut [RigidBody]) {
        for joint in &mut self.contact_joints {
            let (body1, body2) = pair_mut(
                bodies,
                joint.body1_index as usize,
                joint.body2_index as usize,
            );
            joint.pre_step(body1, body2);
        }
    }

    // ------------------------------------------------------------------
    // AoS path
    // ------------------------------------------------------------------

    /// Solve all joints directly against the body array.
    ///
    /// Returns the average-iterations diagnostic: the mean over joints of
    /// `max(endpoint last iteration) + 2`, summed for both passes. Callers
    /// use it for telemetry only.
    pub fn solve_joints_aos(
        &mut self,
        bodies: &mut [RigidBody],
        contact_iterations: usize,
        penetration_iterations: usize,
    ) -> f32 {
        self.solve_prepare_aos(bodies);
        self.stats.solve_calls += 1;

        for iteration_index in 0..contact_iterations {
            let productive =
                self.solve_joints_impulses_aos(bodies, 0, self.contact_joints.len(), iteration_index as i32);
            self.stats.impulse_iterations += 1;
            if !productive {
                self.stats.impulse_early_exits += 1;
                break;
            }
        }

        for iteration_index in 0..penetration_iterations {
            let productive = self.solve_joints_displacement_aos(
                bodies,
                0,
                self.contact_joints.len(),
                iteration_index as i32,
            );
            self.stats.displacement_iterations += 1;
            if !productive {
                self.stats.displacement_early_exits += 1;
                break;
            }
        }

        self.solve_finish_aos(bodies)
    }

    fn solve_prepare_aos(&mut self, bodies: &mut [RigidBody]) {
        self.debug_assert_warm_start();
        for body in bodies.iter_mut() {
            body.last_iteration = -1;
            body.last_displacement_iteration = -1;
        }
    }

    fn solve_finish_aos(&self, bodies: &[RigidBody]) -> f32 {
        let joint_count = self.contact_joints.len();
        if joint_count == 0 {
            return 0.0;
        }

        let mut iteration_sum: i64 = 0;
        for joint in &self.contact_joints {
            let body1 = &bodies[joint.body1_index as usize];
            let body2 = &bodies[joint.body2_index as usize];
            iteration_sum += i64::from(body1.last_iteration.max(body2.last_iteration) + 2);
            iteration_sum += i64::from(
                body1
                    .last_displacement_iteration
                    .max(body2.last_displacement_iteration)
                    + 2,
            );
        }

        iteration_sum as f32 / joint_count as f32
    }

    fn solve_joints_impulses_aos(
        &mut self,
        bodies: &mut [RigidBody],
        joint_start: usize,
        joint_count: usize,
        iteration_index: i32,
    ) -> bool {
        let friction_coefficient = self.config.friction_coefficient;
        let productive_impulse = self.config.productive_impulse;

        let mut productive = false;

        for joint in &mut self.contact_joints[joint_start..joint_start + joint_count] {
            let (body1, body2) = pair_mut(
                bodies,
                joint.body1_index as usize,
                joint.body2_index as usize,
            );

            if body1.last_iteration < iteration_index - 1
                && body2.last_iteration < iteration_index - 1
            {
                continue;
            }

            let mut normal_dv = joint.normal_limiter.dst_velocity;

            normal_dv -= joint.normal_limiter.normal_projector1.x * body1.velocity.x;
            normal_dv -= joint.normal_limiter.normal_projector1.y * body1.velocity.y;
            normal_dv -= joint.normal_limiter.angular_projector1 * body1.angular_velocity;

            normal_dv -= joint.normal_limiter.normal_projector2.x * body2.velocity.x;
            normal_dv -= joint.normal_limiter.normal_projector2.y * body2.velocity.y;
            normal_dv -= joint.normal_limiter.angular_projector2 * body2.angular_velocity;

            let mut normal_delta_impulse = normal_dv * joint.normal_limiter.comp_inv_mass;

            if normal_delta_impulse + joint.normal_limiter.accumulated_impulse < 0.0 {
                normal_delta_impulse = -joint.normal_limiter.accumulated_impulse;
            }

            body1.velocity.x += joint.normal_limiter.comp_mass1_linear.x * normal_delta_impulse;
            body1.velocity.y += joint.normal_limiter.comp_mass1_linear.y * normal_delta_impulse;
            body1.angular_velocity += joint.normal_limiter.comp_mass1_angular * normal_delta_impulse;

            body2.velocity.x += joint.normal_limiter.comp_mass2_linear.x * normal_delta_impulse;
            body2.velocity.y += joint.normal_limiter.comp_mass2_linear.y * normal_delta_impulse;
            body2.angular_velocity += joint.normal_limiter.comp_mass2_angular * normal_delta_impulse;

            joint.normal_limiter.accumulated_impulse += normal_delta_impulse;

            let mut friction_dv = 0.0;

            friction_dv -= joint.friction_limiter.normal_projector1.x * body1.velocity.x;
            friction_dv -= joint.friction_limiter.normal_projector1.y * body1.velocity.y;
            friction_dv -= joint.friction_limiter.angular_projector1 * body1.angular_velocity;

            friction_dv -= joint.friction_limiter.normal_projector2.x * body2.velocity.x;
            friction_dv -= joint.friction_limiter.normal_projector2.y * body2.velocity.y;
            friction_dv -= joint.friction_limiter.angular_projector2 * body2.angular_velocity;

            let mut friction_delta_impulse = friction_dv * joint.friction_limiter.comp_inv_mass;

            let reaction_force = joint.normal_limiter.accumulated_impulse;
            let accumulated_impulse = joint.friction_limiter.accumulated_impulse;

            let mut friction_force = accumulated_impulse + friction_delta_impulse;

            if friction_force.abs() > reaction_force * friction_coefficient {
                let dir = if friction_force > 0.0 { 1.0 } else { -1.0 };
                friction_force = dir * reaction_force * friction_coefficient;
                friction_delta_impulse = friction_force - accumulated_impulse;
            }

            joint.friction_limiter.accumulated_impulse += friction_delta_impulse;

            body1.velocity.x += joint.friction_limiter.comp_mass1_linear.x * friction_delta_impulse;
            body1.velocity.y += joint.friction_limiter.comp_mass1_linear.y * friction_delta_impulse;
            body1.angular_velocity +=
                joint.friction_limiter.comp_mass1_angular * friction_delta_impulse;

            body2.velocity.x += joint.friction_limiter.comp_mass2_linear.x * friction_delta_impulse;
            body2.velocity.y += joint.friction_limiter.comp_mass2_linear.y * friction_delta_impulse;
            body2.angular_velocity +=
                joint.friction_limiter.comp_mass2_angular * friction_delta_impulse;

            let cumulative_impulse = normal_delta_impulse
                .abs()
                .max(friction_delta_impulse.abs());

            if cumulative_impulse > productive_impulse {
                body1.last_iteration = iteration_index;
                body2.last_iteration = iteration_index;
                productive = true;
            }
        }

        productive
    }

    fn solve_joints_displacement_aos(
        &mut self,
        bodies: &mut [RigidBody],
        joint_start: usize,
        joint_count: usize,
        iteration_index: i32,
    ) -> bool {
        let productive_impulse = self.config.productive_impulse;

        let mut productive = false;

        for joint in &mut self.contact_joints[joint_start..joint_start + joint_count] {
            let (body1, body2) = pair_mut(
                bodies,
                joint.body1_index as usize,
                joint.body2_index as usize,
            );

            if body1.last_displacement_iteration < iteration_index - 1
                && body2.last_displacement_iteration < iteration_index - 1
            {
                continue;
            }

            let mut dv = joint.normal_limiter.dst_displacing_velocity;

            dv -= joint.normal_limiter.normal_projector1.x * body1.displacing_velocity.x;
            dv -= joint.normal_limiter.normal_projector1.y * body1.displacing_velocity.y;
            dv -= joint.normal_limiter.angular_projector1 * body1.displacing_angular_velocity;

            dv -= joint.normal_limiter.normal_projector2.x * body2.displacing_velocity.x;
            dv -= joint.normal_limiter.normal_projector2.y * body2.displacing_velocity.y;
            dv -= joint.normal_limiter.angular_projector2 * body2.displacing_angular_velocity;

            let mut displacing_delta_impulse = dv * joint.normal_limiter.comp_inv_mass;

            if displacing_delta_impulse + joint.normal_limiter.accumulated_displacing_impulse < 0.0
            {
                displacing_delta_impulse = -joint.normal_limiter.accumulated_displacing_impulse;
            }

            body1.displacing_velocity.x +=
                joint.normal_limiter.comp_mass1_linear.x * displacing_delta_impulse;
            body1.displacing_velocity.y +=
                joint.normal_limiter.comp_mass1_linear.y * displacing_delta_impulse;
            body1.displacing_angular_velocity +=
                joint.normal_limiter.comp_mass1_angular * displacing_delta_impulse;

            body2.displacing_velocity.x +=
                joint.normal_limiter.comp_mass2_linear.x * displacing_delta_impulse;
            body2.displacing_velocity.y +=
                joint.normal_limiter.comp_mass2_linear.y * displacing_delta_impulse;
            body2.displacing_angular_velocity +=
                joint.normal_limiter.comp_mass2_angular * displacing_delta_impulse;

            joint.normal_limiter.accumulated_displacing_impulse += displacing_delta_impulse;

            if displacing_delta_impulse.abs() > productive_impulse {
                body1.last_displacement_iteration = iteration_index;
                body2.last_displacement_iteration = iteration_index;
                productive = true;
            }
        }

        productive
    }

    // ------------------------------------------------------------------
    // SoA preparation
    // ------------------------------------------------------------------

    /// Produce the joint permutation for lane-width `group_size_target`.
    ///
    /// Greedy single pass: each round admits joints whose endpoints have not
    /// been claimed this round (body tags), until the group reaches the
    /// target width. A short group ends the grouped prefix; the remaining
    /// joints are appended in their current order as the scalar tail.
    ///
    /// Returns the group boundary, rounded down to a multiple of the target:
    /// the wide kernel may run on `joint_index[0..boundary]` only. A target
    /// of 1 yields the identity permutation.
    fn solve_prepare_indices(&mut self, bodies_count: usize, group_size_target: usize) -> usize {
        let joint_count = self.contact_joints.len();
        self.joint_index.clear();
        self.joint_index.resize(joint_count, 0);

        if group_size_target == 1 {
            for (i, slot) in self.joint_index.iter_mut().enumerate() {
                *slot = i as u32;
            }
            return joint_count;
        }

        self.joint_group_bodies.clear();
        self.joint_group_bodies.resize(bodies_count, 0);
        self.joint_group_joints.clear();
        self.joint_group_joints.extend(0..joint_count as u32);

        let mut tag: i32 = 0;
        let mut group_offset = 0;

        while self.joint_group_joints.len() >= group_size_target {
            // gather a group of N joints with non-overlapping bodies
            let mut group_size = 0;

            tag += 1;

            let mut i = 0;
            while i < self.joint_group_joints.len() && group_size < group_size_target {
                let joint_index = self.joint_group_joints[i];
                let joint = &self.contact_joints[joint_index as usize];

                let body1 = joint.body1_index as usize;
                let body2 = joint.body2_index as usize;

                if self.joint_group_bodies[body1] < tag && self.joint_group_bodies[body2] < tag {
                    self.joint_group_bodies[body1] = tag;
                    self.joint_group_bodies[body2] = tag;

                    self.joint_index[group_offset + group_size] = joint_index;
                    group_size += 1;

                    self.joint_group_joints.swap_remove(i);
                } else {
                    i += 1;
                }
            }

            group_offset += group_size;

            if group_size < group_size_target {
                break;
            }
        }

        // the rest of the joints don't form a group; they are solved one by one
        for (i, &joint_index) in self.joint_group_joints.iter().enumerate() {
            self.joint_index[group_offset + i] = joint_index;
        }

        (group_offset / group_size_target) * group_size_target
    }

    fn solve_prepare_bodies(&mut self, bodies: &[RigidBody]) {
        self.solve_bodies_impulse.clear();
        self.solve_bodies_impulse.extend(
            bodies
                .iter()
                .map(|body| SolveBody::from_velocity(body.velocity, body.angular_velocity)),
        );

        self.solve_bodies_displacement.clear();
        self.solve_bodies_displacement.extend(bodies.iter().map(|body| {
            SolveBody::from_velocity(body.displacing_velocity, body.displacing_angular_velocity)
        }));
    }

    fn solve_finish_bodies(&self, bodies: &mut [RigidBody]) {
        for (index, body) in bodies.iter_mut().enumerate() {
            body.velocity = self.solve_bodies_impulse[index].velocity;
            body.angular_velocity = self.solve_bodies_impulse[index].angular_velocity;

            body.displacing_velocity = self.solve_bodies_displacement[index].velocity;
            body.displacing_angular_velocity = self.solve_bodies_displacement[index].angular_velocity;
        }
    }

    fn debug_assert_warm_start(&self) {
        #[cfg(debug_assertions)]
        for joint in &self.contact_joints {
            debug_assert!(
                joint.normal_limiter.accumulated_impulse >= 0.0,
                "normal impulse warm-started negative"
            );
            debug_assert!(
                joint.normal_limiter.accumulated_displacing_impulse >= 0.0,
                "displacing impulse warm-started negative"
            );
        }
    }

    #[cfg(debug_assertions)]
    fn debug_validate_groups(&self, group_boundary: usize, group_size_target: usize) {
        if group_size_target < 2 {
            return;
        }
        let mut seen = Vec::with_capacity(group_size_target * 2);
        for group in self.joint_index[..group_boundary].chunks_exact(group_size_target) {
            seen.clear();
            for &joint_index in group {
                let joint = &self.contact_joints[joint_index as usize];
                seen.push(joint.body1_index);
                seen.push(joint.body2_index);
            }
            seen.sort_unstable();
            let unique = seen.windows(2).all(|pair| pair[0] != pair[1]);
            debug_assert!(unique, "grouped joints share a body");
        }
    }

    fn solve_prepare_soa4(&mut self, bodies: &[RigidBody], group_size_target: usize) -> usize {
        self.debug_assert_warm_start();
        self.solve_prepare_bodies(bodies);
        let group_offset = self.solve_prepare_indices(bodies.len(), group_size_target);
        #[cfg(debug_assertions)]
        self.debug_validate_groups(group_offset, group_size_target);
        pack_joints(
            &self.contact_joints,
            &self.joint_index,
            &mut self.joint_packed4,
        );
        self.stats.joints_packed += self.contact_joints.len() as u64;
        group_offset
    }

    fn solve_prepare_soa8(&mut self, bodies: &[RigidBody], group_size_target: usize) -> usize {
        self.debug_assert_warm_start();
        self.solve_prepare_bodies(bodies);
        let group_offset = self.solve_prepare_indices(bodies.len(), group_size_target);
        #[cfg(debug_assertions)]
        self.debug_validate_groups(group_offset, group_size_target);
        pack_joints(
            &self.contact_joints,
            &self.joint_index,
            &mut self.joint_packed8,
        );
        self.stats.joints_packed += self.contact_joints.len() as u64;
        group_offset
    }

    fn solve_prepare_soa16(&mut self, bodies: &[RigidBody], group_size_target: usize) -> usize {
        self.debug_assert_warm_start();
        self.solve_prepare_bodies(bodies);
        let group_offset = self.solve_prepare_indices(bodies.len(), group_size_target);
        #[cfg(debug_assertions)]
        self.debug_validate_groups(group_offset, group_size_target);
        pack_joints(
            &self.contact_joints,
            &self.joint_index,
            &mut self.joint_packed16,
        );
        self.stats.joints_packed += self.contact_joints.len() as u64;
        group_offset
    }

    // ------------------------------------------------------------------
    // SoA drivers
    // ------------------------------------------------------------------

    /// Solve through the packed batches one lane at a time.
    ///
    /// Same contract and same results as [`Solver::solve_joints_aos`], bit
    /// for bit; this is the baseline the wide variants are measured against.
    pub fn solve_joints_soa_scalar(
        &mut self,
        bodies: &mut [RigidBody],
        contact_iterations: usize,
        penetration_iterations: usize,
    ) -> f32 {
        self.solve_prepare_soa4(bodies, 1);
        let joint_count = self.contact_joints.len();
        let friction_coefficient = self.config.friction_coefficient;
        let productive_impulse = self.config.productive_impulse;
        self.stats.solve_calls += 1;

        for iteration_index in 0..contact_iterations {
            let productive = solve_joints_impulses_soa::<1, 4>(
                &mut self.solve_bodies_impulse,
                &mut self.joint_packed4,
                0,
                joint_count,
                iteration_index as i32,
                friction_coefficient,
                productive_impulse,
            );
            self.stats.impulse_iterations += 1;
            if !productive {
                self.stats.impulse_early_exits += 1;
                break;
            }
        }

        for iteration_index in 0..penetration_iterations {
            let productive = solve_joints_displacement_soa::<1, 4>(
                &mut self.solve_bodies_displacement,
                &mut self.joint_packed4,
                0,
                joint_count,
                iteration_index as i32,
                productive_impulse,
            );
            self.stats.displacement_iterations += 1;
            if !productive {
                self.stats.displacement_early_exits += 1;
                break;
            }
        }

        self.solve_finish_bodies(bodies);
        finish_joints(
            &mut self.contact_joints,
            &self.joint_index,
            &self.joint_packed4,
            &self.solve_bodies_impulse,
            &self.solve_bodies_displacement,
        )
    }

    /// Solve with the 4-wide kernel over the grouped prefix and the one-lane
    /// kernel over the tail.
    pub fn solve_joints_soa_simd4(
        &mut self,
        bodies: &mut [RigidBody],
        contact_iterations: usize,
        penetration_iterations: usize,
    ) -> f32 {
        let group_offset = self.solve_prepare_soa4(bodies, 4);
        let joint_count = self.contact_joints.len();
        let friction_coefficient = self.config.friction_coefficient;
        let productive_impulse = self.config.productive_impulse;
        self.stats.solve_calls += 1;

        for iteration_index in 0..contact_iterations {
            let mut productive = false;

            productive |= solve_joints_impulses_soa::<4, 4>(
                &mut self.solve_bodies_impulse,
                &mut self.joint_packed4,
                0,
                group_offset,
                iteration_index as i32,
                friction_coefficient,
                productive_impulse,
            );
            productive |= solve_joints_impulses_soa::<1, 4>(
                &mut self.solve_bodies_impulse,
                &mut self.joint_packed4,
                group_offset,
                joint_count - group_offset,
                iteration_index as i32,
                friction_coefficient,
                productive_impulse,
            );

            self.stats.impulse_iterations += 1;
            if !productive {
                self.stats.impulse_early_exits += 1;
                break;
            }
        }

        for iteration_index in 0..penetration_iterations {
            let mut productive = false;

            productive |= solve_joints_displacement_soa::<4, 4>(
                &mut self.solve_bodies_displacement,
                &mut self.joint_packed4,
                0,
                group_offset,
                iteration_index as i32,
                productive_impulse,
            );
            productive |= solve_joints_displacement_soa::<1, 4>(
                &mut self.solve_bodies_displacement,
                &mut self.joint_packed4,
                group_offset,
                joint_count - group_offset,
                iteration_index as i32,
                productive_impulse,
            );

            self.stats.displacement_iterations += 1;
            if !productive {
                self.stats.displacement_early_exits += 1;
                break;
            }
        }

        self.solve_finish_bodies(bodies);
        finish_joints(
            &mut self.contact_joints,
            &self.joint_index,
            &self.joint_packed4,
            &self.solve_bodies_impulse,
            &self.solve_bodies_displacement,
        )
    }

    /// Solve with the 8-wide kernel over the grouped prefix and the one-lane
    /// kernel over the tail.
    pub fn solve_joints_soa_simd8(
        &mut self,
        bodies: &mut [RigidBody],
        contact_iterations: usize,
        penetration_iterations: usize,
    ) -> f32 {
        let group_offset = self.solve_prepare_soa8(bodies, 8);
        let joint_count = self.contact_joints.len();
        let friction_coefficient = self.config.friction_coefficient;
        let productive_impulse = self.config.productive_impulse;
        self.stats.solve_calls += 1;

        for iteration_index in 0..contact_iterations {
            let mut productive = false;

            productive |= solve_joints_impulses_soa::<8, 8>(
                &mut self.solve_bodies_impulse,
                &mut self.joint_packed8,
                0,
                group_offset,
                iteration_index as i32,
                friction_coefficient,
                productive_impulse,
            );
            productive |= solve_joints_impulses_soa::<1, 8>(
                &mut self.solve_bodies_impulse,
                &mut self.joint_packed8,
                group_offset,
                joint_count - group_offset,
                iteration_index as i32,
                friction_coefficient,
                productive_impulse,
            );

            self.stats.impulse_iterations += 1;
            if !productive {
                self.stats.impulse_early_exits += 1;
                break;
            }
        }

        for iteration_index in 0..penetration_iterations {
            let mut productive = false;

            productive |= solve_joints_displacement_soa::<8, 8>(
                &mut self.solve_bodies_displacement,
                &mut self.joint_packed8,
                0,
                group_offset,
                iteration_index as i32,
                productive_impulse,
            );
            productive |= solve_joints_displacement_soa::<1, 8>(
                &mut self.solve_bodies_displacement,
                &mut self.joint_packed8,
                group_offset,
                joint_count - group_offset,
                iteration_index as i32,
                productive_impulse,
            );

            self.stats.displacement_iterations += 1;
            if !productive {
                self.stats.displacement_early_exits += 1;
                break;
            }
        }

        self.solve_finish_bodies(bodies);
        finish_joints(
            &mut self.contact_joints,
            &self.joint_index,
            &self.joint_packed8,
            &self.solve_bodies_impulse,
            &self.solve_bodies_displacement,
        )
    }

    /// Solve with the fused-multiply-add kernel: 16-wide batches processed
    /// as two interleaved 8-wide banks, plus the one-lane tail.
    pub fn solve_joints_soa_fma(
        &mut self,
        bodies: &mut [RigidBody],
        contact_iterations: usize,
        penetration_iterations: usize,
    ) -> f32 {
        let group_offset = self.solve_prepare_soa16(bodies, 16);
        let joint_count = self.contact_joints.len();
        let friction_coefficient = self.config.friction_coefficient;
        let productive_impulse = self.config.productive_impulse;
        self.stats.solve_calls += 1;

        for iteration_index in 0..contact_iterations {
            let mut productive = false;

            productive |= solve_joints_impulses_fma(
                &mut self.solve_bodies_impulse,
                &mut self.joint_packed16,
                0,
                group_offset,
                iteration_index as i32,
                friction_coefficient,
                productive_impulse,
            );
            productive |= solve_joints_impulses_soa::<1, 16>(
                &mut self.solve_bodies_impulse,
                &mut self.joint_packed16,
                group_offset,
                joint_count - group_offset,
                iteration_index as i32,
                friction_coefficient,
                productive_impulse,
            );

            self.stats.impulse_iterations += 1;
            if !productive {
                self.stats.impulse_early_exits += 1;
                break;
            }
        }

        for iteration_index in 0..penetration_iterations {
            let mut productive = false;

            productive |= solve_joints_displacement_fma(
                &mut self.solve_bodies_displacement,
                &mut self.joint_packed16,
                0,
                group_offset,
                iteration_index as i32,
                productive_impulse,
            );
            productive |= solve_joints_displacement_soa::<1, 16>(
                &mut self.solve_bodies_displacement,
                &mut self.joint_packed16,
                group_offset,
                joint_count - group_offset,
                iteration_index as i32,
                productive_impulse,
            );

            self.stats.displacement_iterations += 1;
            if !productive {
                self.stats.displacement_early_exits += 1;
                break;
            }
        }

        self.solve_finish_bodies(bodies);
        finish_joints(
            &mut self.contact_joints,
            &self.joint_index,
            &self.joint_packed16,
            &self.solve_bodies_impulse,
            &self.solve_bodies_displacement,
        )
    }
}

/// Borrow two distinct elements of a slice mutably.
fn pair_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (low, high) = slice.split_at_mut(b);
        (&mut low[a], &mut high[0])
    } else {
        let (low, high) = slice.split_at_mut(a);
        (&mut high[0], &mut low[b])
    }
}

/// Scatter joints into packed blocks following the grouped permutation.
fn pack_joints<const N: usize>(
    contact_joints: &[ContactJoint],
    joint_index: &[u32],
    joint_packed: &mut Vec<ContactJointPacked<N>>,
) {
    let joint_count = contact_joints.len();

    joint_packed.clear();
    joint_packed.resize_with(joint_count.div_ceil(N), ContactJointPacked::zeroed);

    for i in 0..joint_count {
        let joint = &contact_joints[joint_index[i] as usize];
        joint_packed[i / N].write_lane(i % N, joint);
    }
}

/// Gather accumulated impulses back into the joints and compute the
/// average-iterations diagnostic.
fn finish_joints<const N: usize>(
    contact_joints: &mut [ContactJoint],
    joint_index: &[u32],
    joint_packed: &[ContactJointPacked<N>],
    solve_bodies_impulse: &[SolveBody],
    solve_bodies_displacement: &[SolveBody],
) -> f32 {
    let joint_count = contact_joints.len();

    for i in 0..joint_count {
        let joint = &mut contact_joints[joint_index[i] as usize];
        joint_packed[i / N].read_lane_impulses(i % N, joint);
    }

    if joint_count == 0 {
        return 0.0;
    }

    let mut iteration_sum: i64 = 0;

    for i in 0..joint_count {
        let packed = &joint_packed[i / N];
        let lane = i % N;

        let body1 = packed.body1_index[lane] as usize;
        let body2 = packed.body2_index[lane] as usize;

        iteration_sum += i64::from(
            solve_bodies_impulse[body1]
                .last_iteration
                .max(solve_bodies_impulse[body2].last_iteration)
                + 2,
        );
        iteration_sum += i64::from(
            solve_bodies_displacement[body1]
                .last_iteration
                .max(solve_bodies_displacement[body2].last_iteration)
                + 2,
        );
    }

    iteration_sum as f32 / joint_count as f32
}

/// Load four body fields for `VN` lanes through the index lanes.
#[inline(always)]
fn gather_bodies<const VN: usize>(
    bodies: &[SolveBody],
    indices: &[u32; VN],
) -> (WideF32<VN>, WideF32<VN>, WideF32<VN>, WideI32<VN>) {
    (
        WideF32::from_fn(|k| bodies[indices[k] as usize].velocity.x),
        WideF32::from_fn(|k| bodies[indices[k] as usize].velocity.y),
        WideF32::from_fn(|k| bodies[indices[k] as usize].angular_velocity),
        WideI32::from_fn(|k| bodies[indices[k] as usize].last_iteration),
    )
}

/// Store four body fields for `VN` lanes through the index lanes.
///
/// Lane writes do not collide because grouped joints reference pairwise
/// distinct bodies.
#[inline(always)]
fn scatter_bodies<const VN: usize>(
    bodies: &mut [SolveBody],
    indices: &[u32; VN],
    velocity_x: WideF32<VN>,
    velocity_y: WideF32<VN>,
    angular_velocity: WideF32<VN>,
    last_iteration: WideI32<VN>,
) {
    for k in 0..VN {
        let body = &mut bodies[indices[k] as usize];
        body.velocity.x = velocity_x.lane(k);
        body.velocity.y = velocity_y.lane(k);
        body.angular_velocity = angular_velocity.lane(k);
        body.last_iteration = last_iteration.lane(k);
    }
}

/// Lane-width-generic impulse kernel over packed blocks of `N`, processing
/// `VN` lanes per step. `VN == N` walks whole blocks; `VN == 1` is the tail
/// kernel that walks lanes inside blocks one at a time.
fn solve_joints_impulses_soa<const VN: usize, const N: usize>(
    solve_bodies: &mut [SolveBody],
    joint_packed: &mut [ContactJointPacked<N>],
    joint_start: usize,
    joint_count: usize,
    iteration_index: i32,
    friction_coefficient: f32,
    productive_impulse: f32,
) -> bool {
    debug_assert!(joint_start % VN == 0 && joint_count % VN == 0);

    let iteration_index0 = WideI32::<VN>::splat(iteration_index);
    let iteration_index2 = WideI32::<VN>::splat(iteration_index - 2);

    let mut productive_any = false;

    for joint_index in (joint_start..joint_start + joint_count).step_by(VN) {
        let packed = &mut joint_packed[joint_index / N];
        let lane = joint_index % N;

        let body1_index: [u32; VN] = core::array::from_fn(|k| packed.body1_index[lane + k]);
        let body2_index: [u32; VN] = core::array::from_fn(|k| packed.body2_index[lane + k]);

        let (mut body1_velocity_x, mut body1_velocity_y, mut body1_angular_velocity, body1_last_iteration) =
            gather_bodies(solve_bodies, &body1_index);
        let (mut body2_velocity_x, mut body2_velocity_y, mut body2_angular_velocity, body2_last_iteration) =
            gather_bodies(solve_bodies, &body2_index);

        let body_productive = body1_last_iteration.gt(iteration_index2)
            | body2_last_iteration.gt(iteration_index2);

        if !body_productive.any() {
            continue;
        }

        let nl = &packed.normal_limiter;
        let j_normal_projector1_x = WideF32::<VN>::load(&nl.normal_projector1_x[lane..]);
        let j_normal_projector1_y = WideF32::<VN>::load(&nl.normal_projector1_y[lane..]);
        let j_normal_projector2_x = WideF32::<VN>::load(&nl.normal_projector2_x[lane..]);
        let j_normal_projector2_y = WideF32::<VN>::load(&nl.normal_projector2_y[lane..]);
        let j_normal_angular_projector1 = WideF32::<VN>::load(&nl.angular_projector1[lane..]);
        let j_normal_angular_projector2 = WideF32::<VN>::load(&nl.angular_projector2[lane..]);
        let j_normal_comp_mass1_linear_x = WideF32::<VN>::load(&nl.comp_mass1_linear_x[lane..]);
        let j_normal_comp_mass1_linear_y = WideF32::<VN>::load(&nl.comp_mass1_linear_y[lane..]);
        let j_normal_comp_mass2_linear_x = WideF32::<VN>::load(&nl.comp_mass2_linear_x[lane..]);
        let j_normal_comp_mass2_linear_y = WideF32::<VN>::load(&nl.comp_mass2_linear_y[lane..]);
        let j_normal_comp_mass1_angular = WideF32::<VN>::load(&nl.comp_mass1_angular[lane..]);
        let j_normal_comp_mass2_angular = WideF32::<VN>::load(&nl.comp_mass2_angular[lane..]);
        let j_normal_comp_inv_mass = WideF32::<VN>::load(&nl.comp_inv_mass[lane..]);
        let mut j_normal_accumulated_impulse = WideF32::<VN>::load(&nl.accumulated_impulse[lane..]);
        let j_normal_dst_velocity = WideF32::<VN>::load(&packed.normal_dst_velocity[lane..]);

        let fl = &packed.friction_limiter;
        let j_friction_projector1_x = WideF32::<VN>::load(&fl.normal_projector1_x[lane..]);
        let j_friction_projector1_y = WideF32::<VN>::load(&fl.normal_projector1_y[lane..]);
        let j_friction_projector2_x = WideF32::<VN>::load(&fl.normal_projector2_x[lane..]);
        let j_friction_projector2_y = WideF32::<VN>::load(&fl.normal_projector2_y[lane..]);
        let j_friction_angular_projector1 = WideF32::<VN>::load(&fl.angular_projector1[lane..]);
        let j_friction_angular_projector2 = WideF32::<VN>::load(&fl.angular_projector2[lane..]);
        let j_friction_comp_mass1_linear_x = WideF32::<VN>::load(&fl.comp_mass1_linear_x[lane..]);
        let j_friction_comp_mass1_linear_y = WideF32::<VN>::load(&fl.comp_mass1_linear_y[lane..]);
        let j_friction_comp_mass2_linear_x = WideF32::<VN>::load(&fl.comp_mass2_linear_x[lane..]);
        let j_friction_comp_mass2_linear_y = WideF32::<VN>::load(&fl.comp_mass2_linear_y[lane..]);
        let j_friction_comp_mass1_angular = WideF32::<VN>::load(&fl.comp_mass1_angular[lane..]);
        let j_friction_comp_mass2_angular = WideF32::<VN>::load(&fl.comp_mass2_angular[lane..]);
        let j_friction_comp_inv_mass = WideF32::<VN>::load(&fl.comp_inv_mass[lane..]);
        let mut j_friction_accumulated_impulse =
            WideF32::<VN>::load(&fl.accumulated_impulse[lane..]);

        let mut normal_dv = j_normal_dst_velocity;

        normal_dv = normal_dv - j_normal_projector1_x * body1_velocity_x;
        normal_dv = normal_dv - j_normal_projector1_y * body1_velocity_y;
        normal_dv = normal_dv - j_normal_angular_projector1 * body1_angular_velocity;

        normal_dv = normal_dv - j_normal_projector2_x * body2_velocity_x;
        normal_dv = normal_dv - j_normal_projector2_y * body2_velocity_y;
        normal_dv = normal_dv - j_normal_angular_projector2 * body2_angular_velocity;

        let mut normal_delta_impulse = normal_dv * j_normal_comp_inv_mass;

        normal_delta_impulse = normal_delta_impulse.max(-j_normal_accumulated_impulse);

        body1_velocity_x = body1_velocity_x + j_normal_comp_mass1_linear_x * normal_delta_impulse;
        body1_velocity_y = body1_velocity_y + j_normal_comp_mass1_linear_y * normal_delta_impulse;
        body1_angular_velocity =
            body1_angular_velocity + j_normal_comp_mass1_angular * normal_delta_impulse;

        body2_velocity_x = body2_velocity_x + j_normal_comp_mass2_linear_x * normal_delta_impulse;
        body2_velocity_y = body2_velocity_y + j_normal_comp_mass2_linear_y * normal_delta_impulse;
        body2_angular_velocity =
            body2_angular_velocity + j_normal_comp_mass2_angular * normal_delta_impulse;

        j_normal_accumulated_impulse = j_normal_accumulated_impulse + normal_delta_impulse;

        let mut friction_dv = WideF32::<VN>::zero();

        friction_dv = friction_dv - j_friction_projector1_x * body1_velocity_x;
        friction_dv = friction_dv - j_friction_projector1_y * body1_velocity_y;
        friction_dv = friction_dv - j_friction_angular_projector1 * body1_angular_velocity;

        friction_dv = friction_dv - j_friction_projector2_x * body2_velocity_x;
        friction_dv = friction_dv - j_friction_projector2_y * body2_velocity_y;
        friction_dv = friction_dv - j_friction_angular_projector2 * body2_angular_velocity;

        let friction_delta_impulse = friction_dv * j_friction_comp_inv_mass;

        let reaction_force = j_normal_accumulated_impulse;
        let accumulated_impulse = j_friction_accumulated_impulse;

        let friction_force = accumulated_impulse + friction_delta_impulse;
        let reaction_force_scaled = reaction_force * WideF32::splat(friction_coefficient);

        let friction_force_abs = friction_force.abs();
        let reaction_force_scaled_signed = reaction_force_scaled.flip_sign(friction_force);
        let friction_delta_impulse_adjusted = reaction_force_scaled_signed - accumulated_impulse;

        let friction_delta_impulse = WideF32::select(
            friction_force_abs.gt(reaction_force_scaled),
            friction_delta_impulse_adjusted,
            friction_delta_impulse,
        );

        j_friction_accumulated_impulse = j_friction_accumulated_impulse + friction_delta_impulse;

        body1_velocity_x = body1_velocity_x + j_friction_comp_mass1_linear_x * friction_delta_impulse;
        body1_velocity_y = body1_velocity_y + j_friction_comp_mass1_linear_y * friction_delta_impulse;
        body1_angular_velocity =
            body1_angular_velocity + j_friction_comp_mass1_angular * friction_delta_impulse;

        body2_velocity_x = body2_velocity_x + j_friction_comp_mass2_linear_x * friction_delta_impulse;
        body2_velocity_y = body2_velocity_y + j_friction_comp_mass2_linear_y * friction_delta_impulse;
        body2_angular_velocity =
            body2_angular_velocity + j_friction_comp_mass2_angular * friction_delta_impulse;

        j_normal_accumulated_impulse.store(&mut packed.normal_limiter.accumulated_impulse[lane..]);
        j_friction_accumulated_impulse
            .store(&mut packed.friction_limiter.accumulated_impulse[lane..]);

        let cumulative_impulse = normal_delta_impulse
            .abs()
            .max(friction_delta_impulse.abs());

        let productive = cumulative_impulse.gt(WideF32::splat(productive_impulse));

        productive_any |= productive.any();

        let body1_last_iteration = WideI32::select(productive, iteration_index0, body1_last_iteration);
        let body2_last_iteration = WideI32::select(productive, iteration_index0, body2_last_iteration);

        scatter_bodies(
            solve_bodies,
            &body1_index,
            body1_velocity_x,
            body1_velocity_y,
            body1_angular_velocity,
            body1_last_iteration,
        );
        scatter_bodies(
            solve_bodies,
            &body2_index,
            body2_velocity_x,
            body2_velocity_y,
            body2_angular_velocity,
            body2_last_iteration,
        );
    }

    productive_any
}

/// Lane-width-generic displacement kernel: the normal-row update applied to
/// the displacing velocities.
fn solve_joints_displacement_soa<const VN: usize, const N: usize>(
    solve_bodies: &mut [SolveBody],
    joint_packed: &mut [ContactJointPacked<N>],
    joint_start: usize,
    joint_count: usize,
    iteration_index: i32,
    productive_impulse: f32,
) -> bool {
    debug_assert!(joint_start % VN == 0 && joint_count % VN == 0);

    let iteration_index0 = WideI32::<VN>::splat(iteration_index);
    let iteration_index2 = WideI32::<VN>::splat(iteration_index - 2);

    let mut productive_any = false;

    for joint_index in (joint_start..joint_start + joint_count).step_by(VN) {
        let packed = &mut joint_packed[joint_index / N];
        let lane = joint_index % N;

        let body1_index: [u32; VN] = core::array::from_fn(|k| packed.body1_index[lane + k]);
        let body2_index: [u32; VN] = core::array::from_fn(|k| packed.body2_index[lane + k]);

        let (mut body1_velocity_x, mut body1_velocity_y, mut body1_angular_velocity, body1_last_iteration) =
            gather_bodies(solve_bodies, &body1_index);
        let (mut body2_velocity_x, mut body2_velocity_y, mut body2_angular_velocity, body2_last_iteration) =
            gather_bodies(solve_bodies, &body2_index);

        let body_productive = body1_last_iteration.gt(iteration_index2)
            | body2_last_iteration.gt(iteration_index2);

        if !body_productive.any() {
            continue;
        }

        let nl = &packed.normal_limiter;
        let j_normal_projector1_x = WideF32::<VN>::load(&nl.normal_projector1_x[lane..]);
        let j_normal_projector1_y = WideF32::<VN>::load(&nl.normal_projector1_y[lane..]);
        let j_normal_projector2_x = WideF32::<VN>::load(&nl.normal_projector2_x[lane..]);
        let j_normal_projector2_y = WideF32::<VN>::load(&nl.normal_projector2_y[lane..]);
        let j_normal_angular_projector1 = WideF32::<VN>::load(&nl.angular_projector1[lane..]);
        let j_normal_angular_projector2 = WideF32::<VN>::load(&nl.angular_projector2[lane..]);
        let j_normal_comp_mass1_linear_x = WideF32::<VN>::load(&nl.comp_mass1_linear_x[lane..]);
        let j_normal_comp_mass1_linear_y = WideF32::<VN>::load(&nl.comp_mass1_linear_y[lane..]);
        let j_normal_comp_mass2_linear_x = WideF32::<VN>::load(&nl.comp_mass2_linear_x[lane..]);
        let j_normal_comp_mass2_linear_y = WideF32::<VN>::load(&nl.comp_mass2_linear_y[lane..]);
        let j_normal_comp_mass1_angular = WideF32::<VN>::load(&nl.comp_mass1_angular[lane..]);
        let j_normal_comp_mass2_angular = WideF32::<VN>::load(&nl.comp_mass2_angular[lane..]);
        let j_normal_comp_inv_mass = WideF32::<VN>::load(&nl.comp_inv_mass[lane..]);
        let j_normal_dst_displacing_velocity =
            WideF32::<VN>::load(&packed.normal_dst_displacing_velocity[lane..]);
        let mut j_normal_accumulated_displacing_impulse =
            WideF32::<VN>::load(&packed.normal_accumulated_displacing_impulse[lane..]);

        let mut dv = j_normal_dst_displacing_velocity;

        dv = dv - j_normal_projector1_x * body1_velocity_x;
        dv = dv - j_normal_projector1_y * body1_velocity_y;
        dv = dv - j_normal_angular_projector1 * body1_angular_velocity;

        dv = dv - j_normal_projector2_x * body2_velocity_x;
        dv = dv - j_normal_projector2_y * body2_velocity_y;
        dv = dv - j_normal_angular_projector2 * body2_angular_velocity;

        let mut displacing_delta_impulse = dv * j_normal_comp_inv_mass;

        displacing_delta_impulse =
            displacing_delta_impulse.max(-j_normal_accumulated_displacing_impulse);

        body1_velocity_x = body1_velocity_x + j_normal_comp_mass1_linear_x * displacing_delta_impulse;
        body1_velocity_y = body1_velocity_y + j_normal_comp_mass1_linear_y * displacing_delta_impulse;
        body1_angular_velocity =
            body1_angular_velocity + j_normal_comp_mass1_angular * displacing_delta_impulse;

        body2_velocity_x = body2_velocity_x + j_normal_comp_mass2_linear_x * displacing_delta_impulse;
        body2_velocity_y = body2_velocity_y + j_normal_comp_mass2_linear_y * displacing_delta_impulse;
        body2_angular_velocity =
            body2_angular_velocity + j_normal_comp_mass2_angular * displacing_delta_impulse;

        j_normal_accumulated_displacing_impulse =
            j_normal_accumulated_displacing_impulse + displacing_delta_impulse;

        j_normal_accumulated_displacing_impulse
            .store(&mut packed.normal_accumulated_displacing_impulse[lane..]);

        let productive = displacing_delta_impulse
            .abs()
            .gt(WideF32::splat(productive_impulse));

        productive_any |= productive.any();

        let body1_last_iteration = WideI32::select(productive, iteration_index0, body1_last_iteration);
        let body2_last_iteration = WideI32::select(productive, iteration_index0, body2_last_iteration);

        scatter_bodies(
            solve_bodies,
            &body1_index,
            body1_velocity_x,
            body1_velocity_y,
            body1_angular_velocity,
            body1_last_iteration,
        );
        scatter_bodies(
            solve_bodies,
            &body2_index,
            body2_velocity_x,
            body2_velocity_y,
            body2_angular_velocity,
            body2_last_iteration,
        );
    }

    productive_any
}

/// Per-bank state for the two-bank fused kernels: velocities of both
/// endpoint bodies across 8 lanes.
#[derive(Clone, Copy)]
struct BankBodies {
    body1_velocity_x: WideF32<8>,
    body1_velocity_y: WideF32<8>,
    body1_angular_velocity: WideF32<8>,
    body2_velocity_x: WideF32<8>,
    body2_velocity_y: WideF32<8>,
    body2_angular_velocity: WideF32<8>,
}

/// One bank of the fused impulse update: full normal + friction step on 8
/// lanes starting at `lane`, accumulated impulses written back in place.
/// Returns the updated body state and both impulse deltas.
#[inline(always)]
fn solve_impulses_bank_fma(
    packed: &mut ContactJointPacked<16>,
    lane: usize,
    bodies: BankBodies,
    friction_coefficient: f32,
) -> (BankBodies, WideF32<8>, WideF32<8>) {
    let BankBodies {
        mut body1_velocity_x,
        mut body1_velocity_y,
        mut body1_angular_velocity,
        mut body2_velocity_x,
        mut body2_velocity_y,
        mut body2_angular_velocity,
    } = bodies;

    let nl = &packed.normal_limiter;
    let j_normal_projector1_x = WideF32::<8>::load(&nl.normal_projector1_x[lane..]);
    let j_normal_projector1_y = WideF32::<8>::load(&nl.normal_projector1_y[lane..]);
    let j_normal_projector2_x = WideF32::<8>::load(&nl.normal_projector2_x[lane..]);
    let j_normal_projector2_y = WideF32::<8>::load(&nl.normal_projector2_y[lane..]);
    let j_normal_angular_projector1 = WideF32::<8>::load(&nl.angular_projector1[lane..]);
    let j_normal_angular_projector2 = WideF32::<8>::load(&nl.angular_projector2[lane..]);
    let j_normal_comp_mass1_linear_x = WideF32::<8>::load(&nl.comp_mass1_linear_x[lane..]);
    let j_normal_comp_mass1_linear_y = WideF32::<8>::load(&nl.comp_mass1_linear_y[lane..]);
    let j_normal_comp_mass2_linear_x = WideF32::<8>::load(&nl.comp_mass2_linear_x[lane..]);
    let j_normal_comp_mass2_linear_y = WideF32::<8>::load(&nl.comp_mass2_linear_y[lane..]);
    let j_normal_comp_mass1_angular = WideF32::<8>::load(&nl.comp_mass1_angular[lane..]);
    let j_normal_comp_mass2_angular = WideF32::<8>::load(&nl.comp_mass2_angular[lane..]);
    let j_normal_comp_inv_mass = WideF32::<8>::load(&nl.comp_inv_mass[lane..]);
    let mut j_normal_accumulated_impulse = WideF32::<8>::load(&nl.accumulated_impulse[lane..]);
    let j_normal_dst_velocity = WideF32::<8>::load(&packed.normal_dst_velocity[lane..]);

    let fl = &packed.friction_limiter;
    let j_friction_projector1_x = WideF32::<8>::load(&fl.normal_projector1_x[lane..]);
    let j_friction_projector1_y = WideF32::<8>::load(&fl.normal_projector1_y[lane..]);
    let j_friction_projector2_x = WideF32::<8>::load(&fl.normal_projector2_x[lane..]);
    let j_friction_projector2_y = WideF32::<8>::load(&fl.normal_projector2_y[lane..]);
    let j_friction_angular_projector1 = WideF32::<8>::load(&fl.angular_projector1[lane..]);
    let j_friction_angular_projector2 = WideF32::<8>::load(&fl.angular_projector2[lane..]);
    let j_friction_comp_mass1_linear_x = WideF32::<8>::load(&fl.comp_mass1_linear_x[lane..]);
    let j_friction_comp_mass1_linear_y = WideF32::<8>::load(&fl.comp_mass1_linear_y[lane..]);
    let j_friction_comp_mass2_linear_x = WideF32::<8>::load(&fl.comp_mass2_linear_x[lane..]);
    let j_friction_comp_mass2_linear_y = WideF32::<8>::load(&fl.comp_mass2_linear_y[lane..]);
    let j_friction_comp_mass1_angular = WideF32::<8>::load(&fl.comp_mass1_angular[lane..]);
    let j_friction_comp_mass2_angular = WideF32::<8>::load(&fl.comp_mass2_angular[lane..]);
    let j_friction_comp_inv_mass = WideF32::<8>::load(&fl.comp_inv_mass[lane..]);
    let mut j_friction_accumulated_impulse = WideF32::<8>::load(&fl.accumulated_impulse[lane..]);

    // The body-1 and body-2 contributions accumulate in separate fused
    // chains and merge once, which is what lets the two banks overlap.
    let mut normal_dv1 = j_normal_dst_velocity;
    normal_dv1 = j_normal_projector1_x.neg_mul_add(body1_velocity_x, normal_dv1);
    normal_dv1 = j_normal_projector1_y.neg_mul_add(body1_velocity_y, normal_dv1);
    normal_dv1 = j_normal_angular_projector1.neg_mul_add(body1_angular_velocity, normal_dv1);

    let mut normal_dv2 = WideF32::<8>::zero();
    normal_dv2 = j_normal_projector2_x.neg_mul_add(body2_velocity_x, normal_dv2);
    normal_dv2 = j_normal_projector2_y.neg_mul_add(body2_velocity_y, normal_dv2);
    normal_dv2 = j_normal_angular_projector2.neg_mul_add(body2_angular_velocity, normal_dv2);

    let normal_dv = normal_dv1 + normal_dv2;

    let mut normal_delta_impulse = normal_dv * j_normal_comp_inv_mass;
    normal_delta_impulse = normal_delta_impulse.max(-j_normal_accumulated_impulse);

    body1_velocity_x = j_normal_comp_mass1_linear_x.mul_add(normal_delta_impulse, body1_velocity_x);
    body1_velocity_y = j_normal_comp_mass1_linear_y.mul_add(normal_delta_impulse, body1_velocity_y);
    body1_angular_velocity =
        j_normal_comp_mass1_angular.mul_add(normal_delta_impulse, body1_angular_velocity);

    body2_velocity_x = j_normal_comp_mass2_linear_x.mul_add(normal_delta_impulse, body2_velocity_x);
    body2_velocity_y = j_normal_comp_mass2_linear_y.mul_add(normal_delta_impulse, body2_velocity_y);
    body2_angular_velocity =
        j_normal_comp_mass2_angular.mul_add(normal_delta_impulse, body2_angular_velocity);

    j_normal_accumulated_impulse = j_normal_accumulated_impulse + normal_delta_impulse;

    let mut friction_dv1 = WideF32::<8>::zero();
    friction_dv1 = j_friction_projector1_x.neg_mul_add(body1_velocity_x, friction_dv1);
    friction_dv1 = j_friction_projector1_y.neg_mul_add(body1_velocity_y, friction_dv1);
    friction_dv1 = j_friction_angular_projector1.neg_mul_add(body1_angular_velocity, friction_dv1);

    let mut friction_dv2 = WideF32::<8>::zero();
    friction_dv2 = j_friction_projector2_x.neg_mul_add(body2_velocity_x, friction_dv2);
    friction_dv2 = j_friction_projector2_y.neg_mul_add(body2_velocity_y, friction_dv2);
    friction_dv2 = j_friction_angular_projector2.neg_mul_add(body2_angular_velocity, friction_dv2);

    let friction_dv = friction_dv1 + friction_dv2;

    let friction_delta_impulse = friction_dv * j_friction_comp_inv_mass;

    let reaction_force = j_normal_accumulated_impulse;
    let accumulated_impulse = j_friction_accumulated_impulse;

    let friction_force = accumulated_impulse + friction_delta_impulse;
    let reaction_force_scaled = reaction_force * WideF32::splat(friction_coefficient);

    let friction_force_abs = friction_force.abs();
    let reaction_force_scaled_signed = reaction_force_scaled.flip_sign(friction_force);
    let friction_delta_impulse_adjusted = reaction_force_scaled_signed - accumulated_impulse;

    let friction_delta_impulse = WideF32::select(
        friction_force_abs.gt(reaction_force_scaled),
        friction_delta_impulse_adjusted,
        friction_delta_impulse,
    );

    j_friction_accumulated_impulse = j_friction_accumulated_impulse + friction_delta_impulse;

    body1_velocity_x = j_friction_comp_mass1_linear_x.mul_add(friction_delta_impulse, body1_velocity_x);
    body1_velocity_y = j_friction_comp_mass1_linear_y.mul_add(friction_delta_impulse, body1_velocity_y);
    body1_angular_velocity =
        j_friction_comp_mass1_angular.mul_add(friction_delta_impulse, body1_angular_velocity);

    body2_velocity_x = j_friction_comp_mass2_linear_x.mul_add(friction_delta_impulse, body2_velocity_x);
    body2_velocity_y = j_friction_comp_mass2_linear_y.mul_add(friction_delta_impulse, body2_velocity_y);
    body2_angular_velocity =
        j_friction_comp_mass2_angular.mul_add(friction_delta_impulse, body2_angular_velocity);

    j_normal_accumulated_impulse.store(&mut packed.normal_limiter.accumulated_impulse[lane..]);
    j_friction_accumulated_impulse.store(&mut packed.friction_limiter.accumulated_impulse[lane..]);

    (
        BankBodies {
            body1_velocity_x,
            body1_velocity_y,
            body1_angular_velocity,
            body2_velocity_x,
            body2_velocity_y,
            body2_angular_velocity,
        },
        normal_delta_impulse,
        friction_delta_impulse,
    )
}

/// One bank of the fused displacement update on 8 lanes starting at `lane`.
#[inline(always)]
fn solve_displacement_bank_fma(
    packed: &mut ContactJointPacked<16>,
    lane: usize,
    bodies: BankBodies,
) -> (BankBodies, WideF32<8>) {
    let BankBodies {
        mut body1_velocity_x,
        mut body1_velocity_y,
        mut body1_angular_velocity,
        mut body2_velocity_x,
        mut body2_velocity_y,
        mut body2_angular_velocity,
    } = bodies;

    let nl = &packed.normal_limiter;
    let j_normal_projector1_x = WideF32::<8>::load(&nl.normal_projector1_x[lane..]);
    let j_normal_projector1_y = WideF32::<8>::load(&nl.normal_projector1_y[lane..]);
    let j_normal_projector2_x = WideF32::<8>::load(&nl.normal_projector2_x[lane..]);
    let j_normal_projector2_y = WideF32::<8>::load(&nl.normal_projector2_y[lane..]);
    let j_normal_angular_projector1 = WideF32::<8>::load(&nl.angular_projector1[lane..]);
    let j_normal_angular_projector2 = WideF32::<8>::load(&nl.angular_projector2[lane..]);
    let j_normal_comp_mass1_linear_x = WideF32::<8>::load(&nl.comp_mass1_linear_x[lane..]);
    let j_normal_comp_mass1_linear_y = WideF32::<8>::load(&nl.comp_mass1_linear_y[lane..]);
    let j_normal_comp_mass2_linear_x = WideF32::<8>::load(&nl.comp_mass2_linear_x[lane..]);
    let j_normal_comp_mass2_linear_y = WideF32::<8>::load(&nl.comp_mass2_linear_y[lane..]);
    let j_normal_comp_mass1_angular = WideF32::<8>::load(&nl.comp_mass1_angular[lane..]);
    let j_normal_comp_mass2_angular = WideF32::<8>::load(&nl.comp_mass2_angular[lane..]);
    let j_normal_comp_inv_mass = WideF32::<8>::load(&nl.comp_inv_mass[lane..]);
    let j_normal_dst_displacing_velocity =
        WideF32::<8>::load(&packed.normal_dst_displacing_velocity[lane..]);
    let mut j_normal_accumulated_displacing_impulse =
        WideF32::<8>::load(&packed.normal_accumulated_displacing_impulse[lane..]);

    let mut dv1 = j_normal_dst_displacing_velocity;
    dv1 = j_normal_projector1_x.neg_mul_add(body1_velocity_x, dv1);
    dv1 = j_normal_projector1_y.neg_mul_add(body1_velocity_y, dv1);
    dv1 = j_normal_angular_projector1.neg_mul_add(body1_angular_velocity, dv1);

    let mut dv2 = WideF32::<8>::zero();
    dv2 = j_normal_projector2_x.neg_mul_add(body2_velocity_x, dv2);
    dv2 = j_normal_projector2_y.neg_mul_add(body2_velocity_y, dv2);
    dv2 = j_normal_angular_projector2.neg_mul_add(body2_angular_velocity, dv2);

    let dv = dv1 + dv2;

    let mut displacing_delta_impulse = dv * j_normal_comp_inv_mass;
    displacing_delta_impulse =
        displacing_delta_impulse.max(-j_normal_accumulated_displacing_impulse);

    body1_velocity_x = j_normal_comp_mass1_linear_x.mul_add(displacing_delta_impulse, body1_velocity_x);
    body1_velocity_y = j_normal_comp_mass1_linear_y.mul_add(displacing_delta_impulse, body1_velocity_y);
    body1_angular_velocity =
        j_normal_comp_mass1_angular.mul_add(displacing_delta_impulse, body1_angular_velocity);

    body2_velocity_x = j_normal_comp_mass2_linear_x.mul_add(displacing_delta_impulse, body2_velocity_x);
    body2_velocity_y = j_normal_comp_mass2_linear_y.mul_add(displacing_delta_impulse, body2_velocity_y);
    body2_angular_velocity =
        j_normal_comp_mass2_angular.mul_add(displacing_delta_impulse, body2_angular_velocity);

    j_normal_accumulated_displacing_impulse =
        j_normal_accumulated_displacing_impulse + displacing_delta_impulse;

    j_normal_accumulated_displacing_impulse
        .store(&mut packed.normal_accumulated_displacing_impulse[lane..]);

    (
        BankBodies {
            body1_velocity_x,
            body1_velocity_y,
            body1_angular_velocity,
            body2_velocity_x,
            body2_velocity_y,
            body2_angular_velocity,
        },
        displacing_delta_impulse,
    )
}

/// Fused-multiply-add impulse kernel: 16 joints per block as two 8-wide
/// banks. Grouping with width 16 guarantees the banks share no bodies, so
/// their loads, computation, and stores are fully independent.
fn solve_joints_impulses_fma(
    solve_bodies: &mut [SolveBody],
    joint_packed: &mut [ContactJointPacked<16>],
    joint_start: usize,
    joint_count: usize,
    iteration_index: i32,
    friction_coefficient: f32,
    productive_impulse: f32,
) -> bool {
    debug_assert!(joint_start % 16 == 0 && joint_count % 16 == 0);

    let iteration_index0 = WideI32::<8>::splat(iteration_index);
    let iteration_index2 = WideI32::<8>::splat(iteration_index - 2);

    let mut productive_any = false;

    for joint_index in (joint_start..joint_start + joint_count).step_by(16) {
        let packed = &mut joint_packed[joint_index / 16];

        let body1_index_0: [u32; 8] = core::array::from_fn(|k| packed.body1_index[k]);
        let body2_index_0: [u32; 8] = core::array::from_fn(|k| packed.body2_index[k]);
        let body1_index_1: [u32; 8] = core::array::from_fn(|k| packed.body1_index[8 + k]);
        let body2_index_1: [u32; 8] = core::array::from_fn(|k| packed.body2_index[8 + k]);

        let (b1_vx_0, b1_vy_0, b1_av_0, body1_last_iteration_0) =
            gather_bodies(solve_bodies, &body1_index_0);
        let (b2_vx_0, b2_vy_0, b2_av_0, body2_last_iteration_0) =
            gather_bodies(solve_bodies, &body2_index_0);
        let (b1_vx_1, b1_vy_1, b1_av_1, body1_last_iteration_1) =
            gather_bodies(solve_bodies, &body1_index_1);
        let (b2_vx_1, b2_vy_1, b2_av_1, body2_last_iteration_1) =
            gather_bodies(solve_bodies, &body2_index_1);

        let body_productive_0 = body1_last_iteration_0.gt(iteration_index2)
            | body2_last_iteration_0.gt(iteration_index2);
        let body_productive_1 = body1_last_iteration_1.gt(iteration_index2)
            | body2_last_iteration_1.gt(iteration_index2);

        if !(body_productive_0 | body_productive_1).any() {
            continue;
        }

        let bank_0 = BankBodies {
            body1_velocity_x: b1_vx_0,
            body1_velocity_y: b1_vy_0,
            body1_angular_velocity: b1_av_0,
            body2_velocity_x: b2_vx_0,
            body2_velocity_y: b2_vy_0,
            body2_angular_velocity: b2_av_0,
        };
        let bank_1 = BankBodies {
            body1_velocity_x: b1_vx_1,
            body1_velocity_y: b1_vy_1,
            body1_angular_velocity: b1_av_1,
            body2_velocity_x: b2_vx_1,
            body2_velocity_y: b2_vy_1,
            body2_angular_velocity: b2_av_1,
        };

        let (bank_0, normal_delta_0, friction_delta_0) =
            solve_impulses_bank_fma(packed, 0, bank_0, friction_coefficient);
        let (bank_1, normal_delta_1, friction_delta_1) =
            solve_impulses_bank_fma(packed, 8, bank_1, friction_coefficient);

        let cumulative_impulse_0 = normal_delta_0.abs().max(friction_delta_0.abs());
        let cumulative_impulse_1 = normal_delta_1.abs().max(friction_delta_1.abs());

        let productive_0 = cumulative_impulse_0.gt(WideF32::splat(productive_impulse));
        let productive_1 = cumulative_impulse_1.gt(WideF32::splat(productive_impulse));

        productive_any |= productive_0.any() | productive_1.any();

        let body1_last_iteration_0 =
            WideI32::select(productive_0, iteration_index0, body1_last_iteration_0);
        let body2_last_iteration_0 =
            WideI32::select(productive_0, iteration_index0, body2_last_iteration_0);
        let body1_last_iteration_1 =
            WideI32::select(productive_1, iteration_index0, body1_last_iteration_1);
        let body2_last_iteration_1 =
            WideI32::select(productive_1, iteration_index0, body2_last_iteration_1);

        scatter_bodies(
            solve_bodies,
            &body1_index_0,
            bank_0.body1_velocity_x,
            bank_0.body1_velocity_y,
            bank_0.body1_angular_velocity,
            body1_last_iteration_0,
        );
        scatter_bodies(
            solve_bodies,
            &body2_index_0,
            bank_0.body2_velocity_x,
            bank_0.body2_velocity_y,
            bank_0.body2_angular_velocity,
            body2_last_iteration_0,
        );
        scatter_bodies(
            solve_bodies,
            &body1_index_1,
            bank_1.body1_velocity_x,
            bank_1.body1_velocity_y,
            bank_1.body1_angular_velocity,
            body1_last_iteration_1,
        );
        scatter_bodies(
            solve_bodies,
            &body2_index_1,
            bank_1.body2_velocity_x,
            bank_1.body2_velocity_y,
            bank_1.body2_angular_velocity,
            body2_last_iteration_1,
        );
    }

    productive_any
}

/// Fused-multiply-add displacement kernel over two 8-wide banks.
fn solve_joints_displacement_fma(
    solve_bodies: &mut [SolveBody],
    joint_packed: &mut [ContactJointPacked<16>],
    joint_start: usize,
    joint_count: usize,
    iteration_index: i32,
    productive_impulse: f32,
) -> bool {
    debug_assert!(joint_start % 16 == 0 && joint_count % 16 == 0);

    let iteration_index0 = WideI32::<8>::splat(iteration_index);
    let iteration_index2 = WideI32::<8>::splat(iteration_index - 2);

    let mut productive_any = false;

    for joint_index in (joint_start..joint_start + joint_count).step_by(16) {
        let packed = &mut joint_packed[joint_index / 16];

        let body1_index_0: [u32; 8] = core::array::from_fn(|k| packed.body1_index[k]);
        let body2_index_0: [u32; 8] = core::array::from_fn(|k| packed.body2_index[k]);
        let body1_index_1: [u32; 8] = core::array::from_fn(|k| packed.body1_index[8 + k]);
        let body2_index_1: [u32; 8] = core::array::from_fn(|k| packed.body2_index[8 + k]);

        let (b1_vx_0, b1_vy_0, b1_av_0, body1_last_iteration_0) =
            gather_bodies(solve_bodies, &body1_index_0);
        let (b2_vx_0, b2_vy_0, b2_av_0, body2_last_iteration_0) =
            gather_bodies(solve_bodies, &body2_index_0);
        let (b1_vx_1, b1_vy_1, b1_av_1, body1_last_iteration_1) =
            gather_bodies(solve_bodies, &body1_index_1);
        let (b2_vx_1, b2_vy_1, b2_av_1, body2_last_iteration_1) =
            gather_bodies(solve_bodies, &body2_index_1);

        let body_productive_0 = body1_last_iteration_0.gt(iteration_index2)
            | body2_last_iteration_0.gt(iteration_index2);
        let body_productive_1 = body1_last_iteration_1.gt(iteration_index2)
            | body2_last_iteration_1.gt(iteration_index2);

        if !(body_productive_0 | body_productive_1).any() {
            continue;
        }

        let bank_0 = BankBodies {
            body1_velocity_x: b1_vx_0,
            body1_velocity_y: b1_vy_0,
            body1_angular_velocity: b1_av_0,
            body2_velocity_x: b2_vx_0,
            body2_velocity_y: b2_vy_0,
            body2_angular_velocity: b2_av_0,
        };
        let bank_1 = BankBodies {
            body1_velocity_x: b1_vx_1,
            body1_velocity_y: b1_vy_1,
            body1_angular_velocity: b1_av_1,
            body2_velocity_x: b2_vx_1,
            body2_velocity_y: b2_vy_1,
            body2_angular_velocity: b2_av_1,
        };

        let (bank_0, displacing_delta_0) = solve_displacement_bank_fma(packed, 0, bank_0);
        let (bank_1, displacing_delta_1) = solve_displacement_bank_fma(packed, 8, bank_1);

        let productive_0 = displacing_delta_0
            .abs()
            .gt(WideF32::splat(productive_impulse));
        let productive_1 = displacing_delta_1
            .abs()
            .gt(WideF32::splat(productive_impulse));

        productive_any |= productive_0.any() | productive_1.any();

        let body1_last_iteration_0 =
            WideI32::select(productive_0, iteration_index0, body1_last_iteration_0);
        let body2_last_iteration_0 =
            WideI32::select(productive_0, iteration_index0, body2_last_iteration_0);
        let body1_last_iteration_1 =
            WideI32::select(productive_1, iteration_index0, body1_last_iteration_1);
        let body2_last_iteration_1 =
            WideI32::select(productive_1, iteration_index0, body2_last_iteration_1);

        scatter_bodies(
            solve_bodies,
            &body1_index_0,
            bank_0.body1_velocity_x,
            bank_0.body1_velocity_y,
            bank_0.body1_angular_velocity,
            body1_last_iteration_0,
        );
        scatter_bodies(
            solve_bodies,
            &body2_index_0,
            bank_0.body2_velocity_x,
            bank_0.body2_velocity_y,
            bank_0.body2_angular_velocity,
            body2_last_iteration_0,
        );
        scatter_bodies(
            solve_bodies,
            &body1_index_1,
            bank_1.body1_velocity_x,
            bank_1.body1_velocity_y,
            bank_1.body1_angular_velocity,
            body1_last_iteration_1,
        );
        scatter_bodies(
            solve_bodies,
            &body2_index_1,
            bank_1.body2_velocity_x,
            bank_1.body2_velocity_y,
            bank_1.body2_angular_velocity,
            body2_last_iteration_1,
        );
    }

    productive_any
}
