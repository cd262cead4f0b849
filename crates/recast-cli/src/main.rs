//! Command line tools for tiled navigation meshes

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use detour::{
    load_nav_mesh_from_binary, NavMesh, NavMeshQuery, PolyFlags, PolyRef, QueryFilter,
    DT_DEFAULT_MAX_NODES,
};
use recast::{BuildContext, BuildSettings, InputGeom, TimerLabel};

/// Inspect navigation mesh files, load input geometry and run path queries
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Log filter used when RUST_LOG is not set
    #[clap(long, default_value = "warn")]
    log_level: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the parameters and tiles of a mesh-set file
    Info {
        /// Mesh-set file
        #[clap(value_parser)]
        mesh: PathBuf,

        /// Also list the links of every polygon
        #[clap(long)]
        links: bool,
    },

    /// Load input geometry and report its bounds and partition
    Geom {
        /// Input geometry file (.obj)
        #[clap(value_parser)]
        input: PathBuf,

        /// Build settings as JSON
        #[clap(long, value_parser)]
        settings: Option<PathBuf>,
    },

    /// Find a polygon path between two polygons of a mesh-set file
    Path {
        /// Mesh-set file
        #[clap(value_parser)]
        mesh: PathBuf,

        /// Start polygon reference (decimal or 0x-prefixed hex)
        #[clap(long, value_parser = parse_poly_ref)]
        start: PolyRef,

        /// End polygon reference (decimal or 0x-prefixed hex)
        #[clap(long, value_parser = parse_poly_ref)]
        end: PolyRef,

        /// Search node budget
        #[clap(long, default_value_t = DT_DEFAULT_MAX_NODES)]
        max_nodes: usize,

        /// Polygon flags to exclude, as a raw bit mask
        #[clap(long, default_value_t = 0)]
        exclude: u16,
    },
}

/// Parse a polygon reference in decimal or hex
fn parse_poly_ref(s: &str) -> Result<PolyRef, String> {
    let id = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    }
    .map_err(|e| format!("invalid polygon reference '{}': {}", s, e))?;
    Ok(PolyRef::new(id))
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    match args.command {
        Commands::Info { mesh, links } => print_info(&mesh, links),
        Commands::Geom { input, settings } => load_geometry(&input, settings.as_deref()),
        Commands::Path {
            mesh,
            start,
            end,
            max_nodes,
            exclude,
        } => find_path(&mesh, start, end, max_nodes, exclude),
    }
}

fn read_nav_mesh(path: &Path) -> Result<NavMesh> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read mesh-set file: {}", path.display()))?;
    let nav_mesh = load_nav_mesh_from_binary(&data)
        .with_context(|| format!("Failed to load navigation mesh: {}", path.display()))?;
    log::info!(
        "loaded {} tiles ({} bytes) from {}",
        nav_mesh.tile_count(),
        data.len(),
        path.display()
    );
    Ok(nav_mesh)
}

/// Print the mesh parameters and a line per tile
fn print_info(path: &Path, show_links: bool) -> Result<()> {
    let nav_mesh = read_nav_mesh(path)?;
    let params = nav_mesh.get_params();

    println!("Navigation mesh {}", path.display());
    println!(
        "  origin: {:?}, tile size: {} x {}",
        params.origin, params.tile_width, params.tile_height
    );
    println!(
        "  tiles: {} of {}, max polys per tile: {}",
        nav_mesh.tile_count(),
        params.max_tiles,
        params.max_polys_per_tile
    );

    for (tile_ref, tile) in nav_mesh.tiles() {
        let Some(header) = tile.header.as_ref() else {
            continue;
        };
        println!(
            "  tile {:>4} ({}, {}, layer {}): base {}, {} polys, {} verts, {} links, {} off-mesh",
            tile_ref.index(),
            header.x,
            header.y,
            header.layer,
            tile_ref.poly_base(),
            tile.polys.len(),
            tile.verts.len() / 3,
            tile.links.len(),
            tile.off_mesh_cons.len()
        );

        if show_links {
            for (i, poly) in tile.polys.iter().enumerate() {
                let targets: Vec<String> = nav_mesh
                    .links(tile, poly)
                    .map(|link| link.reference.to_string())
                    .collect();
                println!("    poly {:>3} -> [{}]", i, targets.join(", "));
            }
        }
    }

    Ok(())
}

/// Load input geometry and report what was loaded
fn load_geometry(input: &Path, settings: Option<&Path>) -> Result<()> {
    let mut ctx = BuildContext::new(true);
    let mut geom = InputGeom::new();

    ctx.start_timer(TimerLabel::Total);
    let loaded = geom.load(&mut ctx, input);
    ctx.stop_timer(TimerLabel::Total);
    if let Err(e) = loaded {
        ctx.dump_log("Build log:")
            .context("Failed to print build log")?;
        return Err(e).with_context(|| format!("Failed to load geometry: {}", input.display()));
    }

    if let Some(settings) = settings {
        let json = std::fs::read_to_string(settings)
            .with_context(|| format!("Failed to read build settings: {}", settings.display()))?;
        let parsed = BuildSettings::from_json(&json)
            .with_context(|| format!("Invalid build settings: {}", settings.display()))?;
        geom.set_build_settings(Some(parsed))?;
    }

    let Some(mesh) = geom.mesh() else {
        bail!("No mesh loaded from {}", input.display());
    };
    println!(
        "Mesh loaded: {} vertices, {} triangles",
        mesh.vert_count, mesh.tri_count
    );
    println!(
        "Mesh bounds: min={:?}, max={:?}",
        geom.mesh_bounds_min(),
        geom.mesh_bounds_max()
    );
    println!(
        "Navmesh bounds: min={:?}, max={:?}",
        geom.nav_mesh_bounds_min(),
        geom.nav_mesh_bounds_max()
    );
    if let Some(chunky) = geom.chunky_mesh() {
        let leaves = chunky.nodes().iter().filter(|n| n.is_leaf()).count();
        println!(
            "Partition: {} nodes, {} chunks, at most {} triangles per chunk",
            chunky.nodes().len(),
            leaves,
            chunky.max_tris_per_chunk()
        );
    }

    ctx.dump_log("Build log:")
        .context("Failed to print build log")?;
    println!(
        "Load time: {:.2}ms",
        ctx.accumulated_time(TimerLabel::Total).as_secs_f64() * 1000.0
    );
    Ok(())
}

/// Find a polygon path between two polygons, starting and ending at their centers
fn find_path(
    path: &Path,
    start: PolyRef,
    end: PolyRef,
    max_nodes: usize,
    exclude: u16,
) -> Result<()> {
    let nav_mesh = read_nav_mesh(path)?;

    let center = |reference: PolyRef| -> Result<glam::Vec3> {
        let (tile, _) = nav_mesh
            .get_tile_and_poly_by_ref(reference)
            .with_context(|| format!("Polygon {} is not in the mesh", reference))?;
        Ok(tile.poly_center(reference.poly_index() as usize))
    };
    let start_pos = center(start)?;
    let end_pos = center(end)?;

    let filter = QueryFilter {
        exclude_flags: PolyFlags::from_bits_truncate(exclude),
        ..QueryFilter::default()
    };

    let mut query = NavMeshQuery::new(&nav_mesh, max_nodes)?;
    let result = query
        .find_path(start, end, start_pos, end_pos, &filter)
        .context("Failed to find path")?;

    println!(
        "Found {} path with {} polygons",
        if result.partial { "partial" } else { "complete" },
        result.polys.len()
    );
    for (i, reference) in result.polys.iter().enumerate() {
        println!("{}: {}", i, reference);
    }

    Ok(())
}
