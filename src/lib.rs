//! impulse2d: 2D Rigid-Body Contact Constraint Solver
//!
//! A sequential impulse (projected Gauss–Seidel) solver for 2D rigid-body
//! contacts, built for wide SIMD execution: joints are greedily grouped into
//! conflict-free batches, transposed into structure-of-arrays blocks, and
//! solved by lane-width-parametric kernels that all produce the same result
//! within reassociation tolerance.
//!
//! # Features
//!
//! - **Two-pass split impulse**: a velocity pass resolving non-penetration
//!   and Coulomb friction, then a displacement pass bleeding off penetration
//!   through separate displacing velocities
//! - **Conflict-free batching**: greedy graph coloring packs joints into
//!   groups whose bodies are pairwise distinct, so wide kernels update body
//!   state lock-free
//! - **Four kernel variants**: scalar over the joint list, scalar over the
//!   packed batches, 4/8-wide portable SIMD, and a 16-wide two-bank
//!   fused-multiply-add path
//! - **Activity tracking**: bodies remember the last iteration that moved
//!   them; quiet joints are skipped and fully quiet sweeps end a pass early
//! - **Deterministic**: fixed iteration order, no wall-clock anywhere, and a
//!   seeded PCG generator for reproducible test scenes
//!
//! # Example
//!
//! ```rust
//! use impulse2d::{ContactJoint, ContactPoint, RigidBody, Solver, Vec2};
//!
//! // A unit body falling onto static ground
//! let mut bodies = vec![
//!     RigidBody::new_dynamic(Vec2::new(0.0, 1.0), 1.0, 1.0),
//!     RigidBody::new_static(Vec2::ZERO),
//! ];
//! bodies[0].velocity = Vec2::new(0.0, -1.0);
//!
//! let mut solver = Solver::default();
//! let contact = ContactPoint::new(
//!     Vec2::new(0.0, 0.5),
//!     Vec2::new(0.0, 0.5),
//!     Vec2::UNIT_Y,
//!     &bodies[0],
//!     &bodies[1],
//! );
//! solver.add_joint(&bodies, ContactJoint::new(0, 1, contact)).unwrap();
//! solver.refresh_joints(&bodies);
//!
//! solver.solve_joints_soa_simd4(&mut bodies, 10, 5);
//! assert!(bodies[0].velocity.y.abs() < 1e-5);
//! ```
//!
//! # Modules
//!
//! - [`math`]: the 2D `f32` vector type
//! - [`simd`]: portable fixed-width lane types used by the batched kernels
//! - [`body`]: rigid bodies and the 16-byte solve-time working copy
//! - [`joint`]: contact joints, constraint rows, refresh and warm start
//! - [`packed`]: structure-of-arrays joint batches
//! - [`solver`]: grouping, marshaling, the solver kernels, and the drivers
//! - [`error`]: the solver error type
//! - [`profiling`]: deterministic pipeline counters
//! - [`rng`]: seeded PCG generator for reproducible scenes
//!
//! # Parallelism
//!
//! The iteration kernels are single-threaded by design; batching exists for
//! SIMD, not threads. The only parallel entry point is the chunked joint
//! refresh behind the `parallel` feature (rayon), which is pure per-joint
//! work and bit-identical to the sequential refresh.

#![warn(missing_docs)]

pub mod body;
pub mod error;
pub mod joint;
pub mod math;
pub mod packed;
pub mod profiling;
pub mod rng;
pub mod simd;
pub mod solver;

pub use body::{RigidBody, SolveBody};
pub use error::SolverError;
pub use joint::{ContactJoint, ContactPoint, Limiter};
pub use math::Vec2;
pub use packed::ContactJointPacked;
pub use profiling::SolverStats;
pub use rng::DeterministicRng;
pub use solver::{Solver, SolverConfig};
