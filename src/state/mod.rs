pub mod observable;
pub mod store;
