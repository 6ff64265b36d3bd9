//! Integration tests against a real OpenSSH server in Docker.
//!
//! The container defined in `tests/docker` is started on first use and left
//! running between runs. Without Docker, or with `HOSTLINK_SKIP_DOCKER` set,
//! every test here returns early.
//!
//! ```bash
//! tests/docker/test_keys/generate_keys.sh   # once, enables key auth tests
//! cargo test --test ssh_integration
//! (cd tests/docker && docker compose down)  # optional cleanup
//! ```

#[macro_use]
pub mod fixtures;

mod connection_tests;
mod pool_tests;
