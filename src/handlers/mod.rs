pub mod claim;
pub mod prize;

pub use claim::claim_config;
pub use prize::prize_config;
