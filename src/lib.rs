pub mod cluster;
pub mod eager_env;
pub mod group;
pub mod loader;
pub mod server;
pub mod utils;
