pub mod imagen;
pub mod media;

pub use imagen::{ImageGenerationError, ImageService, ImagenClient};
pub use media::ImageArtifact;
