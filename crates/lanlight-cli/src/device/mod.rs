//! Device access for CLI commands.
//!
//! Sessions, retries and the discovery loop live in lanlight-core.
//! This module turns CLI flags into core configuration and device selections.

pub mod discovery;
