pub mod image_buf;
pub mod mesh;
pub mod region;
pub mod texel;

pub use image_buf::{ImageBuf, TexelData};
pub use mesh::{Face, Loop, PolyMesh};
pub use region::AtlasRegion;
pub use texel::{DataType, LogResolution, TexelFormat};
