pub mod config;
pub mod error;
pub mod ingestion;
pub mod layer;
pub mod pipeline;
pub mod tiling;
pub mod types;

pub use config::{AtlasConfig, LayerConfig, OutputFormat, PipelineConfig};
pub use error::{PtexError, Result};
pub use layer::{LayerStatus, PtexLayer, TexelGrid, TexturedMesh};
pub use pipeline::Pipeline;
