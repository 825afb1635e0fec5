//! Test utilities and mocks for Quay unit tests.
//!
//! This module provides mock implementations of the outward collaborators
//! (HTTP and VCS) so fetchers and the coordinator can be tested without a
//! network. Every mock records its calls, and can be held at a [`Gate`] to
//! keep a fetch in flight while a test lines up concurrent requests.
//!
//! # Example
//!
//! ```rust,ignore
//! use quay::test_support::{MockHttpClient, MockHttpResponse};
//!
//! #[test]
//! fn test_example() {
//!     let http = MockHttpClient::new();
//!     http.mock_url("https://x/pkg.tgz", MockHttpResponse::ok(left_pad_tarball()));
//!
//!     // Fetch through the mock, then check http.requests()...
//! }
//! ```

pub mod fixtures;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use url::Url;

use crate::core::GitReference;
use crate::sources::errors::RemoteError;
use crate::sources::{HttpClient, VcsClient};

// Re-export fixtures for convenience
pub use fixtures::*;

/// A latch that blocks mock calls until released.
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    /// Create a closed gate.
    pub fn closed() -> Arc<Self> {
        Arc::new(Gate::default())
    }

    /// Let every blocked and future caller through.
    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }
}

/// Poll `condition` until it holds, panicking after five seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Mock HTTP response.
#[derive(Debug, Clone)]
pub struct MockHttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl MockHttpResponse {
    /// Create a successful response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        MockHttpResponse {
            status: 200,
            body: body.into(),
        }
    }

    /// Create a not found response.
    pub fn not_found() -> Self {
        MockHttpResponse {
            status: 404,
            body: b"Not Found".to_vec(),
        }
    }

    /// Create a server error response.
    pub fn server_error(message: &str) -> Self {
        MockHttpResponse {
            status: 500,
            body: message.as_bytes().to_vec(),
        }
    }

    /// Check if this is a successful response.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Default)]
struct HttpState {
    responses: HashMap<String, MockHttpResponse>,
    requests: Vec<String>,
}

/// Mock HTTP client for tarball and registry downloads.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    state: Mutex<HttpState>,
    gate: Option<Arc<Gate>>,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        MockHttpClient::default()
    }

    /// Block every download until the gate is released.
    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Add or replace the response for a URL.
    pub fn mock_url(&self, url: &str, response: MockHttpResponse) -> &Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(url.to_string(), response);
        self
    }

    /// Get all requested URLs.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of requests made.
    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

impl HttpClient for MockHttpClient {
    fn download(&self, url: &Url) -> Result<Vec<u8>, RemoteError> {
        let response = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(url.to_string());
            state.responses.get(url.as_str()).cloned()
        };

        if let Some(gate) = &self.gate {
            gate.wait();
        }

        match response {
            Some(response) if response.is_success() => Ok(response.body),
            Some(response) if (400..500).contains(&response.status) => Err(
                RemoteError::NotFound(format!("{} returned HTTP {}", url, response.status)),
            ),
            Some(response) => Err(RemoteError::Transient(format!(
                "{} returned HTTP {}",
                url, response.status
            ))),
            None => Err(RemoteError::NotFound(format!("no mock response for {}", url))),
        }
    }
}

#[derive(Debug, Default)]
struct VcsState {
    /// (url, reference) -> commit
    refs: HashMap<(String, GitReference), String>,
    /// (url, commit) -> files
    commits: HashMap<(String, String), Vec<(String, String)>>,
    resolves: Vec<(String, GitReference)>,
    checkouts: Vec<(String, String)>,
}

/// Mock VCS client serving in-memory repositories.
#[derive(Debug, Default)]
pub struct MockVcsClient {
    state: Mutex<VcsState>,
    gate: Option<Arc<Gate>>,
}

impl MockVcsClient {
    /// Create a mock with no repositories.
    pub fn new() -> Self {
        MockVcsClient::default()
    }

    /// Block every resolve until the gate is released.
    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Point a reference at a commit (moving it if already set).
    pub fn set_ref(&self, url: &str, reference: GitReference, commit: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .refs
            .insert((url.to_string(), reference), commit.to_string());
        self
    }

    /// Define the files of a commit.
    pub fn add_commit(&self, url: &str, commit: &str, files: &[(&str, &str)]) -> &Self {
        let files = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        self.state
            .lock()
            .unwrap()
            .commits
            .insert((url.to_string(), commit.to_string()), files);
        self
    }

    /// Every resolve call made, in order.
    pub fn resolves(&self) -> Vec<(String, GitReference)> {
        self.state.lock().unwrap().resolves.clone()
    }

    /// Number of resolve calls made.
    pub fn resolve_count(&self) -> usize {
        self.state.lock().unwrap().resolves.len()
    }

    /// Number of checkouts made.
    pub fn checkout_count(&self) -> usize {
        self.state.lock().unwrap().checkouts.len()
    }
}

impl VcsClient for MockVcsClient {
    fn resolve_ref(&self, url: &Url, reference: &GitReference) -> Result<String, RemoteError> {
        let commit = {
            let mut state = self.state.lock().unwrap();
            state.resolves.push((url.to_string(), reference.clone()));
            state
                .refs
                .get(&(url.to_string(), reference.clone()))
                .cloned()
        };

        if let Some(gate) = &self.gate {
            gate.wait();
        }

        commit.ok_or_else(|| RemoteError::NotFound(format!("{} not found in {}", reference, url)))
    }

    fn checkout(&self, url: &Url, commit: &str, dest: &Path) -> Result<(), RemoteError> {
        let files = {
            let mut state = self.state.lock().unwrap();
            state.checkouts.push((url.to_string(), commit.to_string()));
            state
                .commits
                .get(&(url.to_string(), commit.to_string()))
                .cloned()
        };

        let files = files.ok_or_else(|| {
            RemoteError::NotFound(format!("commit {} not found in {}", commit, url))
        })?;

        for (path, content) in files {
            let full = dest.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RemoteError::Transient(e.to_string()))?;
            }
            std::fs::write(&full, content).map_err(|e| RemoteError::Transient(e.to_string()))?;
        }
        Ok(())
    }
}
