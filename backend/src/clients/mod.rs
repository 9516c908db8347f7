pub mod nutrition;
pub mod recognition;
