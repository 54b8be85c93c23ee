pub mod conversion_service;
pub mod converter;
pub mod limiter;
pub mod storage;
