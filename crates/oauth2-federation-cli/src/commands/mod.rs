pub mod check_config;
pub mod proof;
pub mod query;
