//! Loads meshes, builds the scene and casts a grid of rays through it,
//! comparing the accelerated query against the brute force one.

use std::{path::PathBuf, time::Instant};

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use indicatif::ProgressBar;
use quadtrace::{
    Mesh, QbvhSettings, Scene,
    geometry::{FloatType, Intersection, Ray, WorldBox, WorldPoint, WorldVector},
};

#[derive(Parser)]
#[command(name = "quadtrace-cli")]
#[command(about = "Cast rays through a scene and check the accelerator against brute force", long_about = None)]
struct Cli {
    /// Wavefront OBJ files to load, a unit cube is used if none are given
    meshes: Vec<PathBuf>,

    /// Number of rays along each side of the ray grid
    #[arg(short, long, default_value_t = 256)]
    resolution: usize,

    /// Maximum number of primitives in a QBVH leaf
    #[arg(long, default_value_t = 8)]
    max_leaf_primitives: usize,

    /// Maximum depth of the QBVH
    #[arg(long, default_value_t = 48)]
    max_depth: usize,

    /// Skip the comparison with brute force intersection
    #[arg(long)]
    no_verify: bool,

    /// Print debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    use simplelog::LevelFilter::{Debug, Info, Off};
    simplelog::TermLogger::init(
        if cli.verbose { Debug } else { Info },
        simplelog::ConfigBuilder::new()
            .set_target_level(Off)
            .set_location_level(Off)
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let scene = load_scene(&cli)?;
    let bounds = scene.bounding_box();
    if bounds.is_empty() {
        bail!("Scene has no geometry");
    }
    if let Some(qbvh) = scene.accelerator() {
        log::info!("Tree statistics:\n{}", qbvh.statistics());
    }

    let rays = ray_grid(&bounds, cli.resolution);

    let start = Instant::now();
    let hits = scene.intersect_all(&rays);
    let elapsed = start.elapsed();
    let hit_count = hits.iter().filter(|hit| hit.is_some()).count();
    log::info!(
        "{} rays, {} hits in {:.3?} ({:.2} Mrays/s)",
        rays.len(),
        hit_count,
        elapsed,
        rays.len() as f64 / elapsed.as_secs_f64() / 1e6
    );

    if !cli.no_verify {
        verify(&scene, &rays, &hits)?;
    }

    Ok(())
}

fn load_scene(cli: &Cli) -> Result<Scene> {
    let mut scene = Scene::new();

    if cli.meshes.is_empty() {
        log::info!("No meshes given, using a unit cube");
        scene.add_mesh(Mesh::cube());
    }
    for path in &cli.meshes {
        let mesh =
            Mesh::with_obj(path).with_context(|| format!("Loading {}", path.display()))?;
        scene.add_mesh(mesh);
    }

    scene.generate_triangle_buffer();
    log::info!("Scene has {} primitives", scene.primitive_count());

    let start = Instant::now();
    scene.build_accelerator_with(
        &QbvhSettings::builder()
            .max_leaf_primitives(cli.max_leaf_primitives)
            .max_depth(cli.max_depth)
            .build(),
    );
    if let Some(qbvh) = scene.accelerator() {
        log::info!(
            "Accelerator built in {:.3?}: {} inner nodes, {} leaves, {} triangle blocks",
            start.elapsed(),
            qbvh.inner_node_count(),
            qbvh.leaf_count(),
            qbvh.block_count()
        );
    }

    Ok(scene)
}

/// Rays from a point in front of the scene towards a regular grid covering its bounds.
fn ray_grid(bounds: &WorldBox, resolution: usize) -> Vec<Ray> {
    let center = bounds.center();
    let size = bounds.size();
    let eye = center + WorldVector::new(0.0, 0.0, 1.5 * size.norm() + size.z);

    let step = |i: usize| (i as FloatType + 0.5) / resolution as FloatType - 0.5;
    (0..resolution)
        .flat_map(|y| (0..resolution).map(move |x| (x, y)))
        .map(|(x, y)| {
            let target = WorldPoint::new(
                center.x + size.x * step(x),
                center.y - size.y * step(y),
                center.z,
            );
            Ray::new(eye, target - eye)
        })
        .collect()
}

fn verify(scene: &Scene, rays: &[Ray], hits: &[Option<Intersection>]) -> Result<()> {
    const TOLERANCE: FloatType = 1e-4;

    let bar = ProgressBar::new(rays.len() as u64);
    let mut mismatches = 0usize;
    for (ray, hit) in rays.iter().zip(hits) {
        let expected = scene.intersect_brute_force(ray);
        let matching = match (hit, &expected) {
            (Some(a), Some(b)) => (a.t - b.t).abs() <= TOLERANCE * (1.0 + b.t),
            (None, None) => true,
            _ => false,
        };
        if !matching {
            log::debug!(
                "Mismatch for ray {:?}: accelerated {:?}, brute force {:?}",
                ray,
                hit.as_ref().map(|h| h.t),
                expected.as_ref().map(|h| h.t)
            );
            mismatches += 1;
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    if mismatches > 0 {
        bail!("{mismatches} of {} rays differ from brute force", rays.len());
    }
    log::info!("All {} rays match brute force", rays.len());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use assert2::{assert, let_assert};
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_scene_is_hit_everywhere() {
        let_assert!(Ok(scene) = load_scene(&Cli::parse_from(["quadtrace-cli"])));
        let rays = ray_grid(&scene.bounding_box(), 4);
        assert!(rays.len() == 16);

        let hits = scene.intersect_all(&rays);
        assert!(hits.iter().all(|hit| hit.is_some()));
        assert!(verify(&scene, &rays, &hits).is_ok());
    }
}
