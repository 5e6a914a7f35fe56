pub mod cleanup;
pub mod cors;
pub mod data;
pub mod logic;
pub mod model;
pub mod rate_limit;
pub mod routes;
