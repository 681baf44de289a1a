pub mod handlers;
pub mod model;
pub mod storage;
