pub mod codec;
pub mod error;
pub mod model;
pub mod pixels;
pub mod transform;
pub mod worker;

pub use codec::PixelBuffer;
pub use error::{Result, TransformationError};
pub use model::TransformedImage;
pub use transform::Transform;
pub use worker::TransformWorker;
