#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use impulse2d::{ContactJoint, ContactPoint, RigidBody, Solver, Vec2};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Number of bodies (capped)
    body_count: u8,
    /// Per-body velocity components, in small fixed steps
    velocities: Vec<(i8, i8, i8)>,
    /// Joint endpoints as raw indices (validated by add_joint)
    joints: Vec<(u8, u8)>,
    /// Iteration budgets (capped)
    contact_iterations: u8,
    penetration_iterations: u8,
}

// Arbitrary scenes must never panic, and the normal/displacement impulse
// accumulators must come out non-negative with friction inside the cone.
fuzz_target!(|input: FuzzInput| {
    let body_count = (input.body_count as usize).clamp(2, 32);

    let mut bodies = Vec::with_capacity(body_count);
    for i in 0..body_count {
        let mut body = RigidBody::new_dynamic(
            Vec2::new(i as f32 * 1.5, (i % 4) as f32),
            1.0,
            1.0,
        );
        if let Some(&(vx, vy, av)) = input.velocities.get(i) {
            body.velocity = Vec2::new(f32::from(vx) / 16.0, f32::from(vy) / 16.0);
            body.angular_velocity = f32::from(av) / 16.0;
        }
        bodies.push(body);
    }

    let mut solver = Solver::default();
    for &(raw1, raw2) in input.joints.iter().take(64) {
        let body1 = u32::from(raw1) % body_count as u32;
        let body2 = u32::from(raw2) % body_count as u32;
        let b1 = bodies[body1 as usize];
        let b2 = bodies[body2 as usize];
        let mid = (b1.position + b2.position) * 0.5;
        let normal = (b1.position - b2.position).normalize();
        if normal == Vec2::ZERO {
            continue;
        }
        let joint = ContactJoint::new(body1, body2, ContactPoint::new(mid, mid, normal, &b1, &b2));
        // Same-body and out-of-range joints are rejected, not UB
        let _ = solver.add_joint(&bodies, joint);
    }
    solver.refresh_joints(&bodies);

    let contact_iterations = (input.contact_iterations as usize).min(16);
    let penetration_iterations = (input.penetration_iterations as usize).min(16);

    solver.solve_joints_soa_simd8(&mut bodies, contact_iterations, penetration_iterations);

    let mu = solver.config.friction_coefficient;
    for joint in &solver.contact_joints {
        assert!(joint.normal_limiter.accumulated_impulse >= 0.0);
        assert!(joint.normal_limiter.accumulated_displacing_impulse >= 0.0);
        assert!(
            joint.friction_limiter.accumulated_impulse.abs()
                <= joint.normal_limiter.accumulated_impulse * mu + 1e-4
        );
    }
});
