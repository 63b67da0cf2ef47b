//! Application module: the `gridmq` demo binary

pub mod args;
pub mod demo;
pub mod display;
pub mod startup;
