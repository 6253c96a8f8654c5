pub mod ask;
pub mod deduce;
pub mod providers;
pub mod reload;
pub mod search;
