pub mod archive;
pub mod core;
pub mod domains;
