//! Remote wallet API module
//!
//! # Architecture
//!
//! ```text
//! WalletApi (typed endpoints)
//!     ↓
//! RetryingClient ── RequestSigner (HMAC headers)
//!     ↓
//! Transport (reqwest in production, scripted in tests)
//! ```

pub mod client;
pub mod signer;
pub mod wallet_api;

pub use client::{
    ApiResponse, AttemptBackoff, HttpTransport, RetryPolicy, RetryingClient, SignedRequest,
    Transport,
};
pub use signer::{Credentials, Method, Params, RequestSigner, Signature};
pub use wallet_api::{AddressEntry, WalletApi};

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Successful envelope around `data`
    pub fn ok(data: Value) -> ApiResponse {
        ApiResponse {
            code: "0".into(),
            data,
            msg: String::new(),
        }
    }

    #[derive(Default)]
    struct Script {
        queue: VecDeque<Result<ApiResponse>>,
        fallback: Option<ApiResponse>,
    }

    /// Transport answering from per-path scripts and recording every request.
    ///
    /// Paths include the query string. Queued responses are consumed first,
    /// then the sticky fallback repeats.
    #[derive(Default)]
    pub struct ScriptedTransport {
        scripts: Mutex<HashMap<String, Script>>,
        requests: Mutex<Vec<SignedRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a one-shot response for `path`
        pub fn push(&self, path: &str, response: Result<ApiResponse>) {
            self.scripts
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .queue
                .push_back(response);
        }

        /// Answer `path` with `response` whenever the queue is empty
        pub fn respond(&self, path: &str, response: ApiResponse) {
            self.scripts
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .fallback = Some(response);
        }

        pub fn requests(&self) -> Vec<SignedRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn paths(&self) -> Vec<String> {
            self.requests().into_iter().map(|r| r.path).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &SignedRequest) -> Result<ApiResponse> {
            self.requests.lock().unwrap().push(request.clone());

            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.get_mut(&request.path);
            match script {
                Some(script) => match script.queue.pop_front() {
                    Some(response) => response,
                    None => script.fallback.clone().ok_or_else(|| {
                        Error::Internal(format!("script for {} ran out", request.path))
                    }),
                },
                None => Err(Error::Internal(format!(
                    "no scripted response for {}",
                    request.path
                ))),
            }
        }
    }
}
