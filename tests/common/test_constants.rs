//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Project used by configuration fixtures.
pub const DEMO_PROJECT: &str = "demo-project";

/// Zone used when no override is provided.
pub const DEFAULT_ZONE: &str = "us-west1-b";

/// Clone targets used when no override is provided.
pub const DEFAULT_TARGETS: [&str; 3] = ["flask-clone-1", "flask-clone-2", "flask-clone-3"];
