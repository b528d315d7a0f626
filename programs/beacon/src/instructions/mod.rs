pub mod admin;
pub mod cancel_request;
pub mod complete_request;
pub mod create_application;
pub mod create_request;
pub mod get_costs;
