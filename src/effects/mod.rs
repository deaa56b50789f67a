pub mod bus;
pub mod dispatcher;
pub mod outputs;
