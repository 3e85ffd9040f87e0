pub mod burst;
pub mod discovery;
pub mod mapper;
