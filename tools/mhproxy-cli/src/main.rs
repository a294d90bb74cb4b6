//! mhproxy - proxy mesh command line tool
//!
//! Compiles text proxies to the binary cache format, prints their metadata,
//! and fits them to a base mesh read from an OBJ file.

mod obj;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use glam::Vec3;
use mhproxy_core::formats::binary::save_binary_proxy;
use mhproxy_core::formats::text::parse_proxy_file;
use mhproxy_core::{
    BaseMesh, PROXY_FORMAT, ProxyContext, ProxyLoader, ProxyRecord, ProxyType, Skeleton,
    load_proxy, peek_metadata,
};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Vertex count of the default (hm08) base mesh.
const DEFAULT_BASE_VERTS: usize = 13380;

#[derive(Parser)]
#[command(name = "mhproxy")]
#[command(about = "Proxy mesh compiler and fitting tool")]
#[command(version)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a text proxy to the binary cache format
    Compile {
        /// Input .mhclo or .proxy file
        source: PathBuf,

        /// Output .mhpxy file (default: next to the source)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Proxy type (default: from the file extension)
        #[arg(short = 't', long = "type")]
        proxy_type: Option<ProxyType>,

        /// Vertex count of the base mesh
        #[arg(long, default_value_t = DEFAULT_BASE_VERTS)]
        base_verts: usize,
    },

    /// Print uuid and tags without loading geometry
    Peek {
        /// Text or compiled proxy
        path: PathBuf,

        /// Proxy type, enables the compiled-file staleness check
        #[arg(short = 't', long = "type")]
        proxy_type: Option<ProxyType>,
    },

    /// Load a proxy (cache or source) and print a summary
    Info {
        /// Text or compiled proxy
        path: PathBuf,

        /// Proxy type (default: from the file extension)
        #[arg(short = 't', long = "type")]
        proxy_type: Option<ProxyType>,

        /// Vertex count of the base mesh
        #[arg(long, default_value_t = DEFAULT_BASE_VERTS)]
        base_verts: usize,
    },

    /// Fit a proxy to a base mesh and write the result as OBJ vertices
    Fit {
        /// Text or compiled proxy
        proxy: PathBuf,

        /// Base mesh OBJ
        #[arg(short, long)]
        base: PathBuf,

        /// Output OBJ (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Proxy type (default: from the file extension)
        #[arg(short = 't', long = "type")]
        proxy_type: Option<ProxyType>,
    },
}

/// Base mesh backed by positions read from an OBJ file.
struct ObjBaseMesh {
    positions: Vec<Vec3>,
}

impl BaseMesh for ObjBaseMesh {
    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    fn coords(&self) -> &[Vec3] {
        &self.positions
    }

    fn base_skeleton(&self) -> Option<&dyn Skeleton> {
        None
    }
}

/// `.proxy` files are base-mesh proxies, anything else is treated as clothes.
fn type_for(path: &Path, explicit: Option<ProxyType>) -> ProxyType {
    explicit.unwrap_or_else(|| {
        let is_proxy = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(PROXY_FORMAT.proxy_ext));
        if is_proxy {
            ProxyType::Proxymeshes
        } else {
            ProxyType::Clothes
        }
    })
}

fn compile(ctx: &ProxyContext, source: &Path, output: Option<PathBuf>, proxy_type: ProxyType, base_verts: usize) -> Result<()> {
    let record = parse_proxy_file(source, proxy_type, base_verts, ctx)
        .with_context(|| format!("Failed to parse proxy: {}", source.display()))?;
    let output = output.unwrap_or_else(|| PROXY_FORMAT.binary_path(source));
    save_binary_proxy(&record, &output, ctx)
        .with_context(|| format!("Failed to write compiled proxy: {}", output.display()))?;

    tracing::info!(
        "Compiled {} ({} verts, {}) -> {}",
        record.name,
        record.vertex_count(),
        if record.mapping.is_exact_fit_only() { "exact fit" } else { "weighted" },
        output.display()
    );
    Ok(())
}

fn print_info(record: &ProxyRecord) {
    println!("name:        {}", record.name);
    println!("uuid:        {}", record.uuid());
    println!("type:        {}", record.proxy_type);
    println!("basemesh:    {}", record.basemesh);
    println!("version:     {}", record.version);
    if !record.description.is_empty() {
        println!("description: {}", record.description);
    }
    if !record.tags.is_empty() {
        let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
        println!("tags:        {}", tags.join(", "));
    }
    if !record.license.license.is_empty() {
        println!("license:     {}", record.license.license);
    }
    if !record.license.author.is_empty() {
        println!("author:      {}", record.license.author);
    }
    println!("z_depth:     {}", record.z_depth);
    println!("max_pole:    {}", record.max_pole);
    println!(
        "vertices:    {}{}",
        record.vertex_count(),
        if record.mapping.is_exact_fit_only() { " (exact fit)" } else { "" }
    );
    println!(
        "deleted:     {}",
        record.delete_verts.iter().filter(|&&d| d).count()
    );
    let transform = if record.transform.scale.is_some() {
        "scale"
    } else if !record.transform.is_identity() {
        "shear"
    } else {
        "none"
    };
    println!("offset fit:  {transform}");
    if let Some(obj) = &record.obj_file {
        println!("obj_file:    {}", obj.display());
    }
    if let Some(material) = &record.material_file {
        println!("material:    {}", material.display());
    }
    for (pose_type, pose) in &record.special_poses {
        println!("pose:        {pose_type} = {pose}");
    }
    if record.has_custom_vertex_weights() {
        println!("weights:     custom");
    }
}

fn fit(ctx: &ProxyContext, proxy: &Path, base: &Path, output: Option<PathBuf>, proxy_type: ProxyType) -> Result<()> {
    let human = ObjBaseMesh {
        positions: obj::read_positions(base)?,
    };
    let record = load_proxy(ctx, &human, proxy, proxy_type)
        .ok_or_else(|| anyhow!("Failed to load proxy: {}", proxy.display()))?;
    let coords = record
        .coords(&human, true)
        .with_context(|| format!("Failed to fit {} to {}", record.name, base.display()))?;

    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create output: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            obj::write_positions(&mut writer, &record.name, &coords)?;
            writer.flush()?;
            tracing::info!("Fitted {} vertices -> {}", coords.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            obj::write_positions(&mut writer, &record.name, &coords)?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = ProxyContext::default();

    match cli.command {
        Commands::Compile {
            source,
            output,
            proxy_type,
            base_verts,
        } => compile(&ctx, &source, output, type_for(&source, proxy_type), base_verts),

        Commands::Peek { path, proxy_type } => {
            let meta = peek_metadata(&path, proxy_type)
                .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
            println!("uuid: {}", meta.uuid.as_deref().unwrap_or("-"));
            let tags: Vec<&str> = meta.tags.iter().map(String::as_str).collect();
            println!("tags: {}", tags.join(", "));
            Ok(())
        }

        Commands::Info {
            path,
            proxy_type,
            base_verts,
        } => {
            let record = ProxyLoader::new(&ctx, base_verts)
                .load(&path, type_for(&path, proxy_type))
                .ok_or_else(|| anyhow!("Failed to load proxy: {}", path.display()))?;
            print_info(&record);
            Ok(())
        }

        Commands::Fit {
            proxy,
            base,
            output,
            proxy_type,
        } => fit(&ctx, &proxy, &base, output, type_for(&proxy, proxy_type)),
    }
}
