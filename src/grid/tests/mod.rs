//! Test modules for the grid substrate

mod cache;
