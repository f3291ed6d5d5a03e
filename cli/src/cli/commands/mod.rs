pub mod start;
pub mod status;
pub mod token;
