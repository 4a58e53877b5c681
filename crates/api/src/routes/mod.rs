//! HTTP route handlers

pub mod alerts;
pub mod silences;
pub mod summary;
pub mod webhook;
