pub mod claim_records;
pub mod prizes;
pub mod stores;

pub use claim_records as claim_record_entity;
pub use claim_records::ClaimStatus;
pub use prizes as prize_entity;
pub use stores as store_entity;
