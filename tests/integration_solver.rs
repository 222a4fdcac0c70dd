//! Integration tests for impulse2d
//!
//! End-to-end behaviour of the contact solver through the public API only:
//! the scenario suite (resting contact, friction cone, early exit, tail
//! handling), the kernel-equivalence contract between the four solve
//! variants, and the determinism guarantee.

use approx::assert_relative_eq;
use impulse2d::{
    ContactJoint, ContactPoint, DeterministicRng, RigidBody, Solver, SolverConfig, Vec2,
};

// ============================================================================
// Helpers
// ============================================================================

fn dynamic_body(x: f32, y: f32) -> RigidBody {
    RigidBody::new_dynamic(Vec2::new(x, y), 1.0, 1.0)
}

fn joint_between(bodies: &[RigidBody], body1: u32, body2: u32) -> ContactJoint {
    let b1 = &bodies[body1 as usize];
    let b2 = &bodies[body2 as usize];
    let mid = (b1.position + b2.position) * 0.5;
    let normal = (b1.position - b2.position).normalize();
    ContactJoint::new(body1, body2, ContactPoint::new(mid, mid, normal, b1, b2))
}

/// Seeded scene: a loose grid of bodies with random velocities and random
/// contact joints, refreshed and warm-started within the friction cone.
fn random_scene(seed: u64, body_count: usize, joint_count: usize) -> (Vec<RigidBody>, Solver) {
    let mut rng = DeterministicRng::new(seed);

    let mut bodies = Vec::with_capacity(body_count);
    for i in 0..body_count {
        let mut body = dynamic_body(i as f32 * 1.7, (i % 5) as f32 * 0.9);
        body.velocity = Vec2::new(rng.range_f32(-1.0, 1.0), rng.range_f32(-1.0, 1.0));
        body.angular_velocity = rng.range_f32(-0.5, 0.5);
        body.displacing_velocity = Vec2::new(rng.range_f32(-0.1, 0.1), rng.range_f32(-0.1, 0.1));
        body.displacing_angular_velocity = rng.range_f32(-0.1, 0.1);
        bodies.push(body);
    }

    let mut solver = Solver::default();
    while solver.contact_joints.len() < joint_count {
        let body1 = rng.next_below(body_count as u32);
        let body2 = rng.next_below(body_count as u32);
        if body1 == body2 {
            continue;
        }
        let joint = joint_between(&bodies, body1, body2);
        solver.add_joint(&bodies, joint).unwrap();
    }
    solver.refresh_joints(&bodies);

    let mu = solver.config.friction_coefficient;
    for joint in &mut solver.contact_joints {
        let normal = rng.range_f32(0.0, 0.5);
        joint.normal_limiter.accumulated_impulse = normal;
        joint.friction_limiter.accumulated_impulse = rng.range_f32(-mu * normal, mu * normal);
        joint.normal_limiter.dst_velocity = rng.range_f32(0.0, 0.3);
    }

    (bodies, solver)
}

fn assert_bodies_close(a: &[RigidBody], b: &[RigidBody], tolerance: f32) {
    for (body_a, body_b) in a.iter().zip(b) {
        assert_relative_eq!(
            body_a.velocity.x,
            body_b.velocity.x,
            epsilon = tolerance,
            max_relative = tolerance
        );
        assert_relative_eq!(
            body_a.velocity.y,
            body_b.velocity.y,
            epsilon = tolerance,
            max_relative = tolerance
        );
        assert_relative_eq!(
            body_a.angular_velocity,
            body_b.angular_velocity,
            epsilon = tolerance,
            max_relative = tolerance
        );
        assert_relative_eq!(
            body_a.displacing_velocity.x,
            body_b.displacing_velocity.x,
            epsilon = tolerance,
            max_relative = tolerance
        );
        assert_relative_eq!(
            body_a.displacing_velocity.y,
            body_b.displacing_velocity.y,
            epsilon = tolerance,
            max_relative = tolerance
        );
    }
}

// ============================================================================
// Test 1 — Single resting contact
// ============================================================================

/// A unit body approaching static ground comes to rest; the accumulated
/// normal impulse equals the impulse needed to cancel the approach.
#[test]
fn test_resting_contact_comes_to_rest() {
    let mut bodies = vec![dynamic_body(0.0, 1.0), RigidBody::new_static(Vec2::ZERO)];
    bodies[0].velocity = Vec2::new(0.0, -1.0);

    let mut solver = Solver::default();
    let contact = ContactPoint::new(
        Vec2::new(0.0, 0.5),
        Vec2::new(0.0, 0.5),
        Vec2::UNIT_Y,
        &bodies[0],
        &bodies[1],
    );
    solver
        .add_joint(&bodies, ContactJoint::new(0, 1, contact))
        .unwrap();
    solver.refresh_joints(&bodies);

    solver.solve_joints_aos(&mut bodies, 10, 5);

    assert!(bodies[0].velocity.y.abs() < 1e-5);
    assert!(bodies[1].velocity.y.abs() < 1e-5);
    assert_relative_eq!(
        solver.contact_joints[0].normal_limiter.accumulated_impulse,
        1.0,
        epsilon = 1e-5
    );
}

// ============================================================================
// Test 2 — Friction cone clamp
// ============================================================================

/// Tangential sliding against a held normal impulse saturates friction at
/// `mu * normal` after one iteration and never exceeds it.
#[test]
fn test_friction_cone_is_respected() {
    let mut bodies = vec![dynamic_body(0.0, 1.0), dynamic_body(0.0, -1.0)];
    bodies[0].velocity = Vec2::new(1.0, 0.0);

    let mut solver = Solver::default();
    let contact = ContactPoint::new(
        Vec2::ZERO,
        Vec2::ZERO,
        Vec2::UNIT_Y,
        &bodies[0],
        &bodies[1],
    );
    solver
        .add_joint(&bodies, ContactJoint::new(0, 1, contact))
        .unwrap();
    solver.refresh_joints(&bodies);
    solver.contact_joints[0].normal_limiter.accumulated_impulse = 0.5;

    let mu = solver.config.friction_coefficient;

    solver.solve_joints_soa_scalar(&mut bodies, 1, 0);
    let after_one = solver.contact_joints[0].friction_limiter.accumulated_impulse;
    assert_relative_eq!(after_one.abs(), 0.5 * mu, epsilon = 1e-6);

    solver.solve_joints_soa_scalar(&mut bodies, 10, 0);
    let joint = &solver.contact_joints[0];
    assert!(
        joint.friction_limiter.accumulated_impulse.abs()
            <= joint.normal_limiter.accumulated_impulse * mu + 1e-6
    );
}

// ============================================================================
// Test 3 — Early exit
// ============================================================================

/// Separated bodies plus a few one-iteration contacts: the iteration loops
/// must bail out through the unproductive-sweep path, and the diagnostic
/// must reflect the tiny iteration count actually used.
#[test]
fn test_early_exit_with_quiet_scene() {
    let mut bodies: Vec<_> = (0..120).map(|i| dynamic_body(i as f32 * 3.0, 0.0)).collect();

    let mut solver = Solver::default();
    for pair in 0..10u32 {
        let (a, b) = (pair * 2, pair * 2 + 1);
        bodies[a as usize].position = Vec2::new(pair as f32 * 4.0, 1.0);
        bodies[b as usize].position = Vec2::new(pair as f32 * 4.0, -1.0);
        bodies[a as usize].velocity = Vec2::new(0.0, -1.0);
        solver
            .add_joint(&bodies, joint_between(&bodies, a, b))
            .unwrap();
    }
    solver.refresh_joints(&bodies);

    let average = solver.solve_joints_soa_simd8(&mut bodies, 50, 50);

    let stats = solver.stats();
    assert!(stats.impulse_iterations <= 4);
    assert_eq!(stats.impulse_early_exits, 1);
    // Every joint resolved on iteration 0 of the impulse pass and never in
    // the displacement pass: average is (0 + 2) + (-1 + 2) = 3.
    assert_relative_eq!(average, 3.0, epsilon = 1e-6);
}

// ============================================================================
// Test 4 — Kernel equivalence
// ============================================================================

/// The AoS and batched-scalar paths are bit-identical; the wide paths agree
/// within reassociation tolerance.
#[test]
fn test_kernel_equivalence() {
    let (bodies, solver) = random_scene(101, 24, 40);

    let mut bodies_aos = bodies.clone();
    let mut solver_aos = solver.clone();
    solver_aos.solve_joints_aos(&mut bodies_aos, 8, 4);

    let mut bodies_scalar = bodies.clone();
    let mut solver_scalar = solver.clone();
    solver_scalar.solve_joints_soa_scalar(&mut bodies_scalar, 8, 4);

    // Scalar SoA reproduces AoS bit for bit
    for (a, b) in bodies_aos.iter().zip(&bodies_scalar) {
        assert_eq!(a.velocity, b.velocity);
        assert_eq!(a.angular_velocity, b.angular_velocity);
        assert_eq!(a.displacing_velocity, b.displacing_velocity);
    }
    for (a, b) in solver_aos
        .contact_joints
        .iter()
        .zip(&solver_scalar.contact_joints)
    {
        assert_eq!(
            a.normal_limiter.accumulated_impulse,
            b.normal_limiter.accumulated_impulse
        );
        assert_eq!(
            a.friction_limiter.accumulated_impulse,
            b.friction_limiter.accumulated_impulse
        );
    }

    // Wide kernels agree within tolerance
    type SolveFn = fn(&mut Solver, &mut [RigidBody], usize, usize) -> f32;
    let wide_variants: [SolveFn; 3] = [
        Solver::solve_joints_soa_simd4,
        Solver::solve_joints_soa_simd8,
        Solver::solve_joints_soa_fma,
    ];
    for solve in wide_variants {
        let mut bodies_wide = bodies.clone();
        let mut solver_wide = solver.clone();
        solve(&mut solver_wide, &mut bodies_wide, 8, 4);
        assert_bodies_close(&bodies_scalar, &bodies_wide, 1e-3);
    }
}

// ============================================================================
// Test 5 — Tail handling
// ============================================================================

/// A joint count that is not a multiple of the lane width: the grouped
/// prefix runs wide, the tail runs scalar, and the result matches the
/// all-scalar baseline.
#[test]
fn test_tail_handling_37_joints() {
    let (bodies, solver) = random_scene(103, 40, 37);

    let mut bodies_scalar = bodies.clone();
    let mut solver_scalar = solver.clone();
    solver_scalar.solve_joints_soa_scalar(&mut bodies_scalar, 6, 3);

    let mut bodies_wide = bodies;
    let mut solver_wide = solver;
    solver_wide.solve_joints_soa_simd8(&mut bodies_wide, 6, 3);

    assert_bodies_close(&bodies_scalar, &bodies_wide, 1e-3);
}

// ============================================================================
// Test 6 — Invariants
// ============================================================================

/// After any solve: normal impulses are non-negative and friction stays in
/// the Coulomb cone.
#[test]
fn test_impulse_invariants() {
    for seed in [107u64, 109, 113] {
        let (mut bodies, mut solver) = random_scene(seed, 20, 32);
        solver.solve_joints_soa_fma(&mut bodies, 10, 5);

        let mu = solver.config.friction_coefficient;
        for joint in &solver.contact_joints {
            assert!(joint.normal_limiter.accumulated_impulse >= 0.0);
            assert!(joint.normal_limiter.accumulated_displacing_impulse >= 0.0);
            assert!(
                joint.friction_limiter.accumulated_impulse.abs()
                    <= joint.normal_limiter.accumulated_impulse * mu + 1e-5
            );
        }
    }
}

// ============================================================================
// Test 7 — Prepare/finish round trip
// ============================================================================

/// Solving with zero iterations is an identity on bodies and joints.
#[test]
fn test_zero_iteration_solve_is_identity() {
    let (bodies, solver) = random_scene(127, 16, 20);

    let mut bodies_after = bodies.clone();
    let mut solver_after = solver.clone();
    solver_after.solve_joints_soa_simd8(&mut bodies_after, 0, 0);

    for (a, b) in bodies.iter().zip(&bodies_after) {
        assert_eq!(a.position, b.position);
        assert_eq!(a.velocity, b.velocity);
        assert_eq!(a.angular_velocity, b.angular_velocity);
        assert_eq!(a.displacing_velocity, b.displacing_velocity);
    }
    for (a, b) in solver
        .contact_joints
        .iter()
        .zip(&solver_after.contact_joints)
    {
        assert_eq!(
            a.normal_limiter.accumulated_impulse,
            b.normal_limiter.accumulated_impulse
        );
        assert_eq!(
            a.friction_limiter.accumulated_impulse,
            b.friction_limiter.accumulated_impulse
        );
    }
}

// ============================================================================
// Test 8 — Determinism
// ============================================================================

/// Identical seeds produce bit-identical end states, twice over.
#[test]
fn test_solve_determinism() {
    let run = || {
        let (mut bodies, mut solver) = random_scene(131, 20, 28);
        solver.pre_step_joints(&mut bodies);
        solver.solve_joints_soa_simd4(&mut bodies, 10, 5);
        bodies
    };

    let first = run();
    let second = run();
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.velocity, b.velocity);
        assert_eq!(a.angular_velocity, b.angular_velocity);
    }
}

// ============================================================================
// Test 9 — Multi-step warm-started flow
// ============================================================================

/// Two full refresh → pre-step → solve steps in sequence: the second step
/// starts from the first step's impulses and stays well-behaved.
#[test]
fn test_two_step_warm_start_flow() {
    let mut bodies = vec![dynamic_body(0.0, 1.0), RigidBody::new_static(Vec2::ZERO)];
    bodies[0].velocity = Vec2::new(0.2, -1.0);

    let mut solver = Solver::new(SolverConfig::default());
    let contact = ContactPoint::new(
        Vec2::new(0.0, 0.5),
        Vec2::new(0.0, 0.5),
        Vec2::UNIT_Y,
        &bodies[0],
        &bodies[1],
    );
    solver
        .add_joint(&bodies, ContactJoint::new(0, 1, contact))
        .unwrap();

    for _ in 0..2 {
        solver.refresh_joints(&bodies);
        solver.pre_step_joints(&mut bodies);
        solver.solve_joints_soa_simd4(&mut bodies, 10, 5);
    }

    let joint = &solver.contact_joints[0];
    assert!(joint.normal_limiter.accumulated_impulse >= 0.0);
    assert!(bodies[0].velocity.y.abs() < 1e-3);
}
