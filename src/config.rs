use std::path::PathBuf;

use clap::Parser;

use crate::tiling::layout::DEFAULT_MAX_ATLAS_SIZE;
use crate::types::{DataType, LogResolution};

/// Atlas image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// PNG for 8-bit layers, OpenEXR for float layers.
    #[value(name = "auto")]
    Auto,
    #[value(name = "png")]
    Png,
    #[value(name = "exr")]
    Exr,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Auto => write!(f, "auto"),
            OutputFormat::Png => write!(f, "png"),
            OutputFormat::Exr => write!(f, "exr"),
        }
    }
}

/// Atlas packing parameters.
#[derive(Debug, Clone)]
pub struct AtlasConfig {
    pub filter_borders: bool,
    /// Set alpha to 1 when the layer has fewer than four channels.
    pub fill_alpha: bool,
    pub max_size: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            filter_borders: true,
            fill_alpha: true,
            max_size: DEFAULT_MAX_ATLAS_SIZE,
        }
    }
}

/// Parameters of a layer created from scratch (no archive).
#[derive(Debug, Clone)]
pub struct LayerConfig {
    pub name: String,
    pub data_type: DataType,
    pub num_channels: u8,
    pub resolution: LogResolution,
    pub fill_color: Option<[f32; 4]>,
    pub pattern: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            name: "ptex".into(),
            data_type: DataType::Uint8,
            num_channels: 4,
            resolution: LogResolution { u: 5, v: 5 },
            fill_color: None,
            pattern: false,
        }
    }
}

/// Fully resolved pipeline configuration (constructed from CLI args).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub archive: Option<PathBuf>,
    pub output: PathBuf,
    pub layer: LayerConfig,
    pub atlas: AtlasConfig,
    pub output_format: OutputFormat,
    pub resize: Option<LogResolution>,
    pub export_archive: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            archive: None,
            output: PathBuf::new(),
            layer: LayerConfig::default(),
            atlas: AtlasConfig::default(),
            output_format: OutputFormat::Auto,
            resize: None,
            export_archive: false,
            dry_run: false,
            verbose: false,
            threads: None,
        }
    }
}

/// Parse `WxH` (each a power of two) into a log resolution.
pub fn parse_resolution(s: &str) -> std::result::Result<LogResolution, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {s}"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("width {w}: {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("height {h}: {e}"))?;
    LogResolution::from_linear(w, h).map_err(|e| e.to_string())
}

/// Parse `r,g,b[,a]` floats. Alpha defaults to 1.
pub fn parse_color(s: &str) -> std::result::Result<[f32; 4], String> {
    let values = s
        .split(',')
        .map(|c| c.trim().parse::<f32>().map_err(|e| format!("{c}: {e}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    match values[..] {
        [r, g, b] => Ok([r, g, b, 1.0]),
        [r, g, b, a] => Ok([r, g, b, a]),
        _ => Err(format!("expected 3 or 4 components, got {}", values.len())),
    }
}

/// CLI argument definition (clap derive).
#[derive(Parser, Debug)]
#[command(
    name = "ptex-atlas",
    about = "Pack per-face texel grids of a polygon mesh into a filtered atlas",
    version
)]
pub struct CliArgs {
    /// Input mesh (OBJ)
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Texture archive directory (with ptex.json) to import
    #[arg(short = 'a', long)]
    pub archive: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Layer name when no archive is given
    #[arg(long, default_value = "ptex")]
    pub layer_name: String,

    /// Texel data type when no archive is given
    #[arg(long, value_enum, default_value = "uint8")]
    pub data_type: DataType,

    /// Channel count when no archive is given (1-4)
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub channels: u8,

    /// Per-loop grid size when no archive is given, e.g. 32x32
    #[arg(long, default_value = "32x32", value_parser = parse_resolution)]
    pub resolution: LogResolution,

    /// Fill colour r,g,b[,a] for a new layer
    #[arg(long, value_parser = parse_color)]
    pub fill: Option<[f32; 4]>,

    /// Fill a new layer with the debug pattern
    #[arg(long)]
    pub pattern: bool,

    /// Resample every grid to WxH before packing
    #[arg(long, value_parser = parse_resolution)]
    pub resize: Option<LogResolution>,

    /// Skip seam filtering
    #[arg(long)]
    pub no_filter: bool,

    /// Max atlas dimension in texels
    #[arg(long, default_value_t = DEFAULT_MAX_ATLAS_SIZE)]
    pub max_atlas_size: u32,

    /// Atlas image format: auto, png or exr
    #[arg(long, value_enum, default_value = "auto")]
    pub format: OutputFormat,

    /// Also write the layer back out as an archive
    #[arg(long)]
    pub export_archive: bool,

    /// Load inputs and report stats only
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Worker thread count (default: all cores)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,
}

impl From<CliArgs> for PipelineConfig {
    fn from(args: CliArgs) -> Self {
        PipelineConfig {
            input: args.input,
            archive: args.archive,
            output: args.output,
            layer: LayerConfig {
                name: args.layer_name,
                data_type: args.data_type,
                num_channels: args.channels,
                resolution: args.resolution,
                fill_color: args.fill,
                pattern: args.pattern,
            },
            atlas: AtlasConfig {
                filter_borders: !args.no_filter,
                fill_alpha: true,
                max_size: args.max_atlas_size,
            },
            output_format: args.format,
            resize: args.resize,
            export_archive: args.export_archive,
            dry_run: args.dry_run,
            verbose: args.verbose,
            threads: args.threads,
        }
    }
}
