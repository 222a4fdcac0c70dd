//! Benchmarks for impulse2d
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use impulse2d::{ContactJoint, ContactPoint, DeterministicRng, RigidBody, Solver, Vec2};

/// Seeded scene shared by all kernel benchmarks.
fn build_scene(seed: u64, body_count: usize, joint_count: usize) -> (Vec<RigidBody>, Solver) {
    let mut rng = DeterministicRng::new(seed);

    let mut bodies = Vec::with_capacity(body_count);
    for i in 0..body_count {
        let mut body = RigidBody::new_dynamic(
            Vec2::new(i as f32 * 1.7, (i % 9) as f32 * 0.8),
            1.0,
            1.0,
        );
        body.velocity = Vec2::new(rng.range_f32(-1.0, 1.0), rng.range_f32(-1.0, 1.0));
        body.angular_velocity = rng.range_f32(-0.5, 0.5);
        bodies.push(body);
    }

    let mut solver = Solver::default();
    while solver.contact_joints.len() < joint_count {
        let body1 = rng.next_below(body_count as u32);
        let body2 = rng.next_below(body_count as u32);
        if body1 == body2 {
            continue;
        }
        let b1 = &bodies[body1 as usize];
        let b2 = &bodies[body2 as usize];
        let mid = (b1.position + b2.position) * 0.5;
        let normal = (b1.position - b2.position).normalize();
        let joint = ContactJoint::new(body1, body2, ContactPoint::new(mid, mid, normal, b1, b2));
        solver.add_joint(&bodies, joint).unwrap();
    }
    solver.refresh_joints(&bodies);

    for joint in &mut solver.contact_joints {
        joint.normal_limiter.dst_velocity = rng.range_f32(0.0, 0.3);
    }

    (bodies, solver)
}

fn bench_solve_variants(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_joints");

    type SolveFn = fn(&mut Solver, &mut [RigidBody], usize, usize) -> f32;
    let variants: [(&str, SolveFn); 5] = [
        ("aos", Solver::solve_joints_aos),
        ("soa_scalar", Solver::solve_joints_soa_scalar),
        ("soa_simd4", Solver::solve_joints_soa_simd4),
        ("soa_simd8", Solver::solve_joints_soa_simd8),
        ("soa_fma", Solver::solve_joints_soa_fma),
    ];

    let (bodies, solver) = build_scene(7, 256, 512);

    for (name, solve) in variants {
        group.bench_function(name, |b| {
            b.iter_batched(
                || (bodies.clone(), solver.clone()),
                |(mut bodies, mut solver)| {
                    solve(&mut solver, black_box(&mut bodies), 10, 5)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_joints");

    let (bodies, solver) = build_scene(11, 256, 512);

    group.bench_function("sequential", |b| {
        b.iter_batched(
            || solver.clone(),
            |mut solver| solver.refresh_joints(black_box(&bodies)),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_solve_variants, bench_refresh);
criterion_main!(benches);
