pub mod ledger;
pub mod models;

pub use ledger::{InMemoryPledgeLedger, PledgeError, PledgeStore};
pub use models::{Pledge, PledgeStatus};
