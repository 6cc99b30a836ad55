pub mod binding;
pub mod config;
pub mod deserialize_optional_name;
pub mod utils;
