pub mod allocation_engine;
pub mod claim_service;
pub mod identity_ledger;
pub mod identity_policy;

pub use allocation_engine::*;
pub use claim_service::*;
pub use identity_ledger::*;
pub use identity_policy::*;
