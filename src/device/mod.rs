pub mod btle;
pub mod codec;
pub mod connection;
pub mod constants;
pub mod radio;
pub mod types;
