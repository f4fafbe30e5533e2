// Host-facing adapters over the engine store

pub mod delimited;
