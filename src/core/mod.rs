pub mod currency;
pub mod ids;
pub mod investment;
pub mod pool;
pub mod tranche;
pub mod transaction;
