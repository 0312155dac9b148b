pub mod access;
pub mod catalog;
pub mod quota;
pub mod records;
pub mod relay;
pub mod review;
pub mod upload;
pub mod users;
