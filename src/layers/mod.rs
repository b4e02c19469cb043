pub mod layer;
pub mod style;
