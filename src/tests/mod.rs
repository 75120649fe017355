mod cache;
mod common;
mod config;
mod lockfile;
mod range;
