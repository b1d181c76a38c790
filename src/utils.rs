//! Utility functions shared by the ingestors and the catalog store

pub mod time;
