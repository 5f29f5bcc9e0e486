pub mod claim;
pub mod common;
pub mod identity;
pub mod pagination;

pub use claim::*;
pub use common::*;
pub use identity::*;
pub use pagination::*;
