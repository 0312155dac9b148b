pub mod classes;
pub mod files;
pub mod materials;
