mod animation;
mod component;
mod skinning;

pub use animation::*;
pub use component::*;
pub use skinning::*;
