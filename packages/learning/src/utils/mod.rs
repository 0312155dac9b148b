pub mod jwt;
pub mod keys;
