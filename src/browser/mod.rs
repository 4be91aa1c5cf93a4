//! Browser Automation
//!
//! HTTP-mode page controller plus session/credential persistence. Every
//! operation is gated by the safety guard before it touches the network.

pub mod controller;
pub mod session;

pub use controller::{BrowserConfig, BrowserController, PageState};
pub use session::{SessionManager, SessionState, StoredCredential, VaultError};
