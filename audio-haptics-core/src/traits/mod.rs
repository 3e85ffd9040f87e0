pub mod actuator;
pub mod capture_backend;
