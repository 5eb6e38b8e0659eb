mod ledger;
mod repository;

pub use ledger::*;
pub use repository::*;
