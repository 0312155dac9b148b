pub mod class;
pub mod material;
pub mod multipart;
pub mod shared;
