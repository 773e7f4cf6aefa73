//! Integration tests for the sweeper
//!
//! These tests use wiremock to create mock HTTP servers and run whole
//! sessions end-to-end over real HTTP.

mod assets_tests;
mod common;
mod rescrape_tests;
mod sweep_tests;
