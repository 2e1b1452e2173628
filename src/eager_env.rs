use std::env;
use std::sync::LazyLock;

macro_rules! define_env_vars {
    ($(($name:ident, $env_name:expr, $type:ty)),* $(,)?) => {
        $(
            pub static $name: LazyLock<$type> = LazyLock::new(|| {
                let val = env::var($env_name).unwrap_or_else(|_| {
                    panic!("Missing required environment variable: {}", $env_name)
                });
                val.parse::<$type>().unwrap_or_else(|_| {
                    panic!(
                        "Failed to parse environment variable {} with value '{}' as {}",
                        $env_name,
                        val,
                        stringify!($type)
                    )
                })
            });
        )*

        /// Force initialization of all environment variables at startup
        /// Call this early in main() to fail fast if any env vars are missing
        pub fn check_env() {
            $(
                let _ = *$name;
            )*
        }
    };
}

// Define all environment variables
define_env_vars!(
    (PORT, "PORT", u16),
    // This node's address as peers reach it, e.g. "http://10.0.0.1:8080".
    (SELF_ADDRESS, "SELF_ADDRESS", String),
    // Comma-separated full cluster list, normally including SELF_ADDRESS.
    // May be empty for a standalone node.
    (PEER_ADDRESSES, "PEER_ADDRESSES", String),
    (CACHE_CAPACITY, "CACHE_CAPACITY", usize),
    (CACHE_ROOT, "CACHE_ROOT", String),
);
