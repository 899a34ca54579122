#![forbid(unsafe_code)]

pub mod adapter;
pub mod cli;
pub mod content;
pub mod crawl;
pub mod crawler;
pub mod evaluate;
pub mod expression;
pub mod http;
pub mod identity;
pub mod logging;
pub mod model;
pub mod tags;
