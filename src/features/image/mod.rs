pub mod font;
pub mod handler;
pub mod renderer;
mod service;
pub mod types;
pub mod wrap;

pub use font::{FontCandidate, FontResolver, TextFont};
pub use handler::create_image_router;
pub use renderer::{
    ImageRenderer, ProceduralRenderer, RenderError, RenderedImage, encode_png, synthesize,
};
pub use service::{ImageService, random_seed};
pub use types::{GenerateParams, GenerateRequest, GenerateResponse, Seed};
pub use wrap::wrap_text;
