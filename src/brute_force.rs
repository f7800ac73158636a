//! Exact O(n^2) pairwise summation behind the same `Simulation` trait, kept as
//! the accuracy baseline for the tree.

use nalgebra::{SVector, SimdComplexField};
use rayon::prelude::*;

use crate::shared::{
    Float, Integrator, LeapFrogIntegrator, Particle, Simulation, SimulationError,
    SimulationSettings, validate_time_step,
};

pub struct BruteForceSimulation<F: Float, const D: usize, P, I = LeapFrogIntegrator<F, D, P>>
where
    P: Particle<F, D>,
    I: Integrator<F, D, P>,
{
    points: Vec<P>,
    integrator: I,
    settings: SimulationSettings<F>,
    elapsed: F,
}

/// Force exerted on `point` by `other`, with the same softening-floor
/// semantics as the tree evaluator.
fn pair_force<F: Float, const D: usize, P: Particle<F, D>>(
    point: &P,
    other: &P,
    settings: &SimulationSettings<F>,
) -> SVector<F, D> {
    let r = other.position() - point.position();
    let d2 = r.norm_squared();
    let d = SimdComplexField::simd_sqrt(d2);
    if d <= settings.softening {
        return SVector::<F, D>::zeros();
    }
    let magnitude = settings.g * point.get_mass() * other.get_mass() / d2;
    r * (magnitude / d)
}

impl<F: Float, const D: usize, P, I> BruteForceSimulation<F, D, P, I>
where
    P: Particle<F, D>,
    I: Integrator<F, D, P>,
{
    fn update_forces(&mut self) {
        let points = &self.points;
        let settings = &self.settings;
        let forces: Vec<SVector<F, D>> = points
            .par_iter()
            .enumerate()
            .map(|(i, point)| {
                points
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, other)| pair_force(point, other, settings))
                    .fold(SVector::<F, D>::zeros(), |acc, f| acc + f)
            })
            .collect();

        for (point, force) in self.points.iter_mut().zip(forces) {
            *point.force_mut() += force;
        }
    }
}

impl<F: Float, const D: usize, P, I> Simulation<F, D, P, I> for BruteForceSimulation<F, D, P, I>
where
    P: Particle<F, D>,
    I: Integrator<F, D, P>,
{
    fn new(
        points: Vec<P>,
        integrator: I,
        settings: SimulationSettings<F>,
    ) -> Result<Self, SimulationError> {
        for point in &points {
            point.validate()?;
        }
        Ok(Self {
            points,
            integrator,
            settings,
            elapsed: F::from(0.0).unwrap(),
        })
    }

    fn step(&mut self, dt: F) -> Result<(), SimulationError> {
        validate_time_step(dt)?;
        if self.points.is_empty() {
            return Ok(());
        }

        self.integrator.integrate_pre_force(&mut self.points, dt);
        self.update_forces();
        self.integrator.integrate_after_force(&mut self.points, dt);
        self.elapsed += dt;
        Ok(())
    }

    fn add_point(&mut self, mut point: P) -> Result<(), SimulationError> {
        point.validate()?;
        point.force_mut().fill(F::from(0.0).unwrap());
        self.points.push(point);
        Ok(())
    }

    fn points(&self) -> &[P] {
        &self.points
    }

    fn settings(&self) -> &SimulationSettings<F> {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut SimulationSettings<F> {
        &mut self.settings
    }

    fn elapsed(&self) -> F {
        self.elapsed
    }
}
