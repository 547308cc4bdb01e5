pub mod call_context;
pub mod error;

pub use call_context::CallContext;
pub use error::AppError;
