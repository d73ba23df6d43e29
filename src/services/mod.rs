//! Business services

mod shortener;

pub use shortener::{BatchUrlRequest, BatchUrlResponse, ShortenerService, UserUrl};
