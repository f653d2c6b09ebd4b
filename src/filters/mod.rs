pub mod cors;

pub use cors::CorsSettings;
