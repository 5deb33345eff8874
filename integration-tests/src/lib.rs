//! Live smoke tests against a real tenant. They read `secrets.json` from the
//! crate directory and are ignored by default.

pub mod config;
