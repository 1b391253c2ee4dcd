pub mod adjacency;
pub mod atlas_packer;
pub mod atlas_writer;
pub mod border_filter;
pub mod layout;
pub mod primitives;

pub use adjacency::EdgeAdjacency;
pub use atlas_packer::{AtlasImage, pack_loops, update_grids_from_atlas};
pub use border_filter::{AdjacentEdge, FilterStats, Side, filter_borders};
pub use layout::{GuillotinePacker, Layout, LayoutItem, LayoutSolver, PackedLayout};
pub use primitives::{AverageBlender, BorderBlender, FilterResampler, Primitives, Resampler};
