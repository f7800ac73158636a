//! Tree-accelerated simulation stepping.

use log::debug;
use rayon::prelude::*;

use crate::octree::OrthTree;
use crate::shared::{
    Float, Integrator, LeapFrogIntegrator, Particle, Simulation, SimulationError,
    SimulationSettings, validate_time_step,
};

/// Per-step schedule, in strict order: rebuild the tree from current
/// positions, accumulate forces for every body in parallel against that
/// now-immutable tree, then integrate. The force phase needs no locks: each
/// rayon task writes only the force of its own body, and the tree is a shared
/// immutable borrow for the whole phase.
pub struct BarnesHutSimulation<F: Float, const D: usize, P, I = LeapFrogIntegrator<F, D, P>>
where
    P: Particle<F, D>,
    I: Integrator<F, D, P>,
{
    points: Vec<P>,
    tree: OrthTree<F, D>,
    integrator: I,
    settings: SimulationSettings<F>,
    elapsed: F,
}

impl<F: Float, const D: usize, P, I> BarnesHutSimulation<F, D, P, I>
where
    P: Particle<F, D>,
    I: Integrator<F, D, P>,
{
    fn update_forces(&mut self) {
        self.tree.build(&self.points, self.settings.max_depth);
        debug!(
            "octree rebuilt: {} nodes over {} bodies",
            self.tree.node_count(),
            self.points.len()
        );

        let tree = &self.tree;
        let settings = &self.settings;
        self.points.par_iter_mut().for_each(|point| {
            let force = tree.force_on(point, settings);
            *point.force_mut() += force;
        });
    }

    /// Read-only view of the current tree, for diagnostics.
    pub fn tree(&self) -> &OrthTree<F, D> {
        &self.tree
    }
}

impl<F: Float, const D: usize, P, I> Simulation<F, D, P, I> for BarnesHutSimulation<F, D, P, I>
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
            tree: OrthTree::new(),
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
