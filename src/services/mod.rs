pub mod auth;
pub mod import;
pub mod queue;
pub mod status;
pub mod validation;
