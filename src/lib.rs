pub mod config;
pub mod constants;
pub mod control_plane;
pub mod delivery;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod rate_limiter;
