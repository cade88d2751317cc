//! Eatos core: session synchronization, secure credential cache, and AI
//! food analysis for the Eatos diet tracker.
//!
//! ARCHITECTURE
//! ============
//! Screens are out of scope. What remains is the glue the screens consume:
//!
//! - [`store`]: encrypted key-value storage scoped to the app data directory.
//! - [`cache`]: the credential cache and theme preference built on [`store`].
//! - [`auth`]: the remote auth provider seam and its Firebase implementation.
//! - [`session`]: the session store that reconciles cache and provider state.
//! - [`analysis`]: text/image nutrition estimates via Gemini.
//!
//! Every external collaborator sits behind a trait so tests can swap in fakes.

pub mod analysis;
pub mod auth;
pub mod cache;
pub mod config;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
