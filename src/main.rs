use std::error::Error;
use std::time::Instant;

use clap::Parser;
use log::info;
use nalgebra::{SVector, Vector3};
use rand::{Rng, SeedableRng, rngs::StdRng};

use gravitree::barnes_hut::BarnesHutSimulation;
use gravitree::brute_force::BruteForceSimulation;
use gravitree::shared::{
    LeapFrogIntegrator, Particle, PointBody, Simulation, SimulationSettings,
};

type Body3 = PointBody<f64, 3>;
type Integrator3 = LeapFrogIntegrator<f64, 3, Body3>;

#[derive(Parser, Debug)]
#[command(about = "N-body gravity demo: Barnes-Hut octree vs direct summation")]
struct Args {
    /// Number of orbiting bodies around the central mass
    #[arg(short = 'n', long, default_value_t = 1000)]
    bodies: usize,

    #[arg(long, default_value_t = 1000)]
    steps: usize,

    #[arg(long, default_value_t = 1e-4)]
    dt: f64,

    /// Barnes-Hut opening angle; 0 forces exact summation
    #[arg(long, default_value_t = 0.5)]
    theta: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Use exact O(n^2) summation instead of the octree
    #[arg(long)]
    brute: bool,
}

/// Heavy central body plus a cloud of light bodies on roughly circular orbits,
/// radii scattered for the benefit of an external renderer.
fn spawn_cluster(n: usize, g: f64, rng: &mut StdRng) -> Vec<Body3> {
    const CENTRAL_MASS: f64 = 1e3;

    let mut points = Vec::with_capacity(n + 1);
    points.push(Body3::new(
        SVector::zeros(),
        SVector::zeros(),
        CENTRAL_MASS,
        2.0,
    ));

    for _ in 0..n {
        // sampled as azimuth plus a small tilt so the tangent below never
        // degenerates
        let angle = rng.random_range(0.0..std::f64::consts::TAU);
        let direction =
            Vector3::new(angle.cos(), angle.sin(), rng.random_range(-0.2..0.2)).normalize();
        let radius = rng.random_range(2.0..20.0);
        let position = direction * radius;

        // tangential speed for a circular orbit around the central mass
        let speed = (g * CENTRAL_MASS / radius).sqrt();
        let tangent = direction.cross(&Vector3::z()).normalize();

        points.push(Body3::new(
            position,
            tangent * speed,
            rng.random_range(0.1..1.0),
            rng.random_range(0.05..0.5),
        ));
    }
    points
}

fn run<S>(mut sim: S, steps: usize, dt: f64) -> Result<(), Box<dyn Error>>
where
    S: Simulation<f64, 3, Body3, Integrator3>,
{
    let start = Instant::now();
    for _ in 0..steps {
        sim.step(dt)?;
    }
    let elapsed = start.elapsed();
    info!(
        "{} steps over {} bodies in {:.3?} ({:.1} steps/s)",
        steps,
        sim.points().len(),
        elapsed,
        steps as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let settings = SimulationSettings {
        theta: args.theta,
        ..SimulationSettings::default()
    };
    let mut rng = StdRng::seed_from_u64(args.seed);
    let points = spawn_cluster(args.bodies, settings.g, &mut rng);

    info!(
        "{} bodies, theta = {}, {} evaluator",
        points.len(),
        args.theta,
        if args.brute { "direct" } else { "octree" }
    );

    if args.brute {
        let sim =
            BruteForceSimulation::<f64, 3, Body3, Integrator3>::new(points, Integrator3::new(), settings)?;
        run(sim, args.steps, args.dt)
    } else {
        let sim =
            BarnesHutSimulation::<f64, 3, Body3, Integrator3>::new(points, Integrator3::new(), settings)?;
        run(sim, args.steps, args.dt)
    }
}
