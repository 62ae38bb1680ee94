//! End-to-end tests for the session layer against a mock API server.
//!
//! - `harness.rs`      - mock server, seeded session, notification recorder
//! - `single_flight.rs` - concurrent invalidations share one refresh
//! - `invalidation.rs` - 401 and `logged_in: false` recovery, retry caps, passthrough endpoints
//! - `refresh_failure.rs` - failed refresh rejects every waiter and tears down atomically
//! - `login.rs`        - login, second factor, identity and permissions
//! - `logout.rs`       - best-effort server logout and local teardown

mod login;
