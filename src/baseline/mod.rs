pub mod handlers;
pub mod model;
pub mod storage;
pub mod variance;
