//! Integration tests entry point
//!
//! Every module under integration/ is compiled into this one test binary.

mod integration;
