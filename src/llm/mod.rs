pub mod client;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod response_parser;
pub mod sse_parser;
pub mod types;
