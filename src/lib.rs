pub mod colormap;
pub mod config;
pub mod data;
pub mod names;
pub mod pipeline;
pub mod prepare;
pub mod projection;
pub mod render;
pub mod server;
pub mod types;
