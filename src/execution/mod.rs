pub mod batch;
pub mod executor;
pub mod expr;
pub mod key;
pub mod operators;

pub use executor::Executor;
