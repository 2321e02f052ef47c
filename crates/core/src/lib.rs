pub mod config;
pub mod context;
pub mod domain;
pub mod errors;

pub use context::{Interrupted, RequestContext};
pub use domain::customer::{Customer, CustomerId};
pub use errors::ServiceError;
