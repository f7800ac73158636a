// This file defines shared behavior and state records used by both the
// tree-accelerated and brute-force simulations.

use std::error::Error;
use std::fmt;
use std::iter::Sum;
use std::marker::PhantomData;

use nalgebra::{RealField, SVector};
use num_traits::NumCast;

/// Scalar type the simulation is generic over. Shipped entry points and tests
/// instantiate `f64`; positions and masses span many orders of magnitude.
pub trait Float: RealField + NumCast + Copy + Sum<Self> + Send + Sync {}

impl<T> Float for T where T: RealField + NumCast + Copy + Sum<T> + Send + Sync {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationError {
    NonPositiveMass,
    NonFiniteState,
    InvalidRadius,
    InvalidTimeStep,
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::NonPositiveMass => {
                write!(f, "body mass must be strictly positive and finite")
            }
            SimulationError::NonFiniteState => {
                write!(f, "body position and velocity must be finite")
            }
            SimulationError::InvalidRadius => {
                write!(f, "body radius must be finite and non-negative")
            }
            SimulationError::InvalidTimeStep => {
                write!(f, "time step must be finite and non-negative")
            }
        }
    }
}

impl Error for SimulationError {}

pub trait Particle<F: Float, const D: usize>: Send + Sync {
    fn new(position: SVector<F, D>, velocity: SVector<F, D>, mass: F, radius: F) -> Self;
    fn position(&self) -> &SVector<F, D>;
    fn velocity(&self) -> &SVector<F, D>;
    fn force(&self) -> &SVector<F, D>;
    fn position_mut(&mut self) -> &mut SVector<F, D>;
    fn velocity_mut(&mut self) -> &mut SVector<F, D>;
    fn force_mut(&mut self) -> &mut SVector<F, D>;
    fn get_mass(&self) -> F;
    fn get_radius(&self) -> F;

    /// Reject state that would poison tree aggregates (NaN/Inf propagates to
    /// every ancestor node for the rest of the step).
    fn validate(&self) -> Result<(), SimulationError> {
        let zero = F::from(0.0).unwrap();
        if !(self.get_mass() > zero) || !self.get_mass().is_finite() {
            return Err(SimulationError::NonPositiveMass);
        }
        let finite = self.position().iter().all(|x| x.is_finite())
            && self.velocity().iter().all(|x| x.is_finite());
        if !finite {
            return Err(SimulationError::NonFiniteState);
        }
        if !(self.get_radius() >= zero) || !self.get_radius().is_finite() {
            return Err(SimulationError::InvalidRadius);
        }
        Ok(())
    }
}

/// Point-mass body. The radius is carried for external rendering only and
/// never enters the physics.
#[derive(Clone, Debug, PartialEq)]
pub struct PointBody<F: Float, const D: usize> {
    pub position: SVector<F, D>,
    pub velocity: SVector<F, D>,
    pub force: SVector<F, D>,
    pub mass: F,
    pub radius: F,
}

impl<F: Float, const D: usize> Particle<F, D> for PointBody<F, D> {
    fn new(position: SVector<F, D>, velocity: SVector<F, D>, mass: F, radius: F) -> Self {
        Self {
            position,
            velocity,
            force: SVector::<F, D>::zeros(),
            mass,
            radius,
        }
    }

    fn position(&self) -> &SVector<F, D> {
        &self.position
    }

    fn velocity(&self) -> &SVector<F, D> {
        &self.velocity
    }

    fn force(&self) -> &SVector<F, D> {
        &self.force
    }

    fn position_mut(&mut self) -> &mut SVector<F, D> {
        &mut self.position
    }

    fn velocity_mut(&mut self) -> &mut SVector<F, D> {
        &mut self.velocity
    }

    fn force_mut(&mut self) -> &mut SVector<F, D> {
        &mut self.force
    }

    fn get_mass(&self) -> F {
        self.mass
    }

    fn get_radius(&self) -> F {
        self.radius
    }
}

/// Tunables passed explicitly into the scheduler and force evaluation, never
/// process-wide globals.
#[derive(Clone, Debug)]
pub struct SimulationSettings<F: Float> {
    /// Gravitational constant.
    pub g: F,
    /// Opening angle: a node of half-width `s` at distance `d` is treated as a
    /// single point mass when `s / d < theta`. 0 degenerates to exact O(n^2)
    /// summation, values toward 1 trade accuracy for speed.
    pub theta: F,
    /// Minimum-distance floor; separations at or below it contribute no force.
    pub softening: F,
    /// Subdivision cutoff for (near-)coincident bodies.
    pub max_depth: usize,
}

impl<F: Float> Default for SimulationSettings<F> {
    fn default() -> Self {
        Self {
            g: F::from(1.0).unwrap(),
            theta: F::from(0.5).unwrap(),
            softening: F::from(1e-6).unwrap(),
            max_depth: 32,
        }
    }
}

/// Axis-aligned cube, the region covered by one tree node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds<F: Float, const D: usize> {
    pub center: SVector<F, D>,
    pub half_width: F,
}

impl<F: Float, const D: usize> Bounds<F, D> {
    pub fn new(center: SVector<F, D>, half_width: F) -> Self {
        Self { center, half_width }
    }

    /// Cube around the elementwise min/max corners of all positions: center is
    /// the midpoint, half-width is half the diagonal so every body fits.
    /// `points` must be non-empty.
    pub fn enclosing<P: Particle<F, D>>(points: &[P]) -> Self {
        let mut min = *points[0].position();
        let mut max = min;
        for point in points.iter().skip(1) {
            for axis in 0..D {
                min[axis] = RealField::min(min[axis], point.position()[axis]);
                max[axis] = RealField::max(max[axis], point.position()[axis]);
            }
        }
        let half = F::from(0.5).unwrap();
        Self {
            center: (min + max) * half,
            half_width: (max - min).norm() * half,
        }
    }

    pub fn min(&self) -> SVector<F, D> {
        self.center.map(|c| c - self.half_width)
    }

    pub fn max(&self) -> SVector<F, D> {
        self.center.map(|c| c + self.half_width)
    }

    pub fn contains(&self, point: &SVector<F, D>) -> bool {
        (0..D).all(|axis| {
            point[axis] >= self.center[axis] - self.half_width
                && point[axis] <= self.center[axis] + self.half_width
        })
    }

    /// Orthant of `point` relative to the cube center: bit `i` is set when the
    /// coordinate on axis `i` is on the positive half.
    pub fn get_orthant(&self, point: &SVector<F, D>) -> usize {
        let mut orthant = 0;
        for axis in 0..D {
            if point[axis] >= self.center[axis] {
                orthant |= 1 << axis;
            }
        }
        orthant
    }

    /// Sub-cube covering the given orthant, half the width of this one.
    pub fn create_orthant(&self, orthant: usize) -> Self {
        let quarter = self.half_width * F::from(0.5).unwrap();
        let mut center = self.center;
        for axis in 0..D {
            if orthant & (1 << axis) != 0 {
                center[axis] += quarter;
            } else {
                center[axis] -= quarter;
            }
        }
        Self::new(center, quarter)
    }
}

pub trait Integrator<F: Float, const D: usize, P: Particle<F, D>> {
    fn integrate_pre_force(&mut self, points: &mut [P], dt: F);
    fn integrate_after_force(&mut self, points: &mut [P], dt: F);
}

/// Velocity-Verlet split (drift-kick-drift): position advances a half step
/// before forces, then velocity a full step and position the remaining half
/// step after. Symplectic, so long-run energy stays bounded.
pub struct LeapFrogIntegrator<F: Float, const D: usize, P: Particle<F, D>> {
    _marker: PhantomData<(F, P)>,
}

impl<F: Float, const D: usize, P: Particle<F, D>> LeapFrogIntegrator<F, D, P> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<F: Float, const D: usize, P: Particle<F, D>> Default for LeapFrogIntegrator<F, D, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float, const D: usize, P: Particle<F, D>> Integrator<F, D, P>
    for LeapFrogIntegrator<F, D, P>
{
    fn integrate_pre_force(&mut self, points: &mut [P], dt: F) {
        let half_dt = dt * F::from(0.5).unwrap();
        for point in points.iter_mut() {
            let dx = *point.velocity() * half_dt;
            *point.position_mut() += dx;
        }
    }

    fn integrate_after_force(&mut self, points: &mut [P], dt: F) {
        let half_dt = dt * F::from(0.5).unwrap();
        for point in points.iter_mut() {
            let acceleration = *point.force() / point.get_mass();
            *point.velocity_mut() += acceleration * dt;
            let dx = *point.velocity() * half_dt;
            *point.position_mut() += dx;
            point.force_mut().fill(F::from(0.0).unwrap());
        }
    }
}

/// Semi-implicit Euler: velocity first from the full-step acceleration, then
/// position from the new velocity. One force evaluation, lower accuracy.
pub struct SemiImplicitEulerIntegrator<F: Float, const D: usize, P: Particle<F, D>> {
    _marker: PhantomData<(F, P)>,
}

impl<F: Float, const D: usize, P: Particle<F, D>> SemiImplicitEulerIntegrator<F, D, P> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<F: Float, const D: usize, P: Particle<F, D>> Default
    for SemiImplicitEulerIntegrator<F, D, P>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float, const D: usize, P: Particle<F, D>> Integrator<F, D, P>
    for SemiImplicitEulerIntegrator<F, D, P>
{
    fn integrate_pre_force(&mut self, _points: &mut [P], _dt: F) {}

    fn integrate_after_force(&mut self, points: &mut [P], dt: F) {
        for point in points.iter_mut() {
            let acceleration = *point.force() / point.get_mass();
            *point.velocity_mut() += acceleration * dt;
            let dx = *point.velocity() * dt;
            *point.position_mut() += dx;
            point.force_mut().fill(F::from(0.0).unwrap());
        }
    }
}

pub trait Simulation<F: Float, const D: usize, P, I>
where
    P: Particle<F, D>,
    I: Integrator<F, D, P>,
{
    fn new(
        points: Vec<P>,
        integrator: I,
        settings: SimulationSettings<F>,
    ) -> Result<Self, SimulationError>
    where
        Self: Sized;

    /// Advance one step. Forces are evaluated against a single consistent
    /// snapshot of all positions before any position moves.
    fn step(&mut self, dt: F) -> Result<(), SimulationError>;

    /// Append a validated body with zero accumulated force, effective from the
    /// next step.
    fn add_point(&mut self, point: P) -> Result<(), SimulationError>;

    fn points(&self) -> &[P];
    fn settings(&self) -> &SimulationSettings<F>;
    fn settings_mut(&mut self) -> &mut SimulationSettings<F>;
    fn elapsed(&self) -> F;
}

/// Shared step-boundary check for `dt`.
pub(crate) fn validate_time_step<F: Float>(dt: F) -> Result<(), SimulationError> {
    if !dt.is_finite() || dt < F::from(0.0).unwrap() {
        return Err(SimulationError::InvalidTimeStep);
    }
    Ok(())
}
