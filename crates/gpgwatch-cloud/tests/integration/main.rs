//! Integration tests for gpgwatch-cloud
//!
//! Uses wiremock to simulate the Dropbox and Google Drive HTTP APIs and
//! verifies authentication, folder verification and both upload strategies
//! of each client.

mod common;

mod test_dropbox;
mod test_gdrive;
