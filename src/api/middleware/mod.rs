//! API middleware

mod logging;
mod token;

pub use logging::{RequestLogging, REQUEST_ID_HEADER};
pub use token::{Authorized, TokenAuth};
