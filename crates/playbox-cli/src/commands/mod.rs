pub mod bundle;
pub mod dev;
pub mod version;
