pub mod middleware;
pub mod routes;

// Re-export public types and functions
pub use middleware::log_request_errors;
pub use routes::{CONVERT_ROUTE, ConvertResponse, convert_to_webp};
