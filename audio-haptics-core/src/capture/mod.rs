pub mod ring_buffer_backend;
pub mod supervisor;
pub mod synthetic;
