pub mod config;
pub mod mjpeg;
pub mod routes;
pub mod state;
pub mod supervisor;
