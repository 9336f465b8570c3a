//! Integration tests for drivemirror-graph
//!
//! Uses wiremock to simulate the Microsoft Graph API and the identity
//! platform, and verifies end-to-end behavior of the request executor,
//! listings, folder resolution, copies and path resolution.


mod test_auth;
