pub mod semantic;
pub mod store;
