//! Shared helpers for the kadvice test suites.

#![allow(dead_code)]

pub mod fixtures;
