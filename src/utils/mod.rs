pub mod identity;
pub mod weighted_draw;

pub use identity::*;
pub use weighted_draw::*;
