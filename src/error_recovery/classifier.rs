//! Error classification
//!
//! Errors are classified once per recovery call into an
//! [`ErrorClassification`]; the strategy selector only ever matches on that.

use crate::error::RecoveryError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Kind of network failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkErrorKind {
    /// Host has no connectivity
    Offline,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 429
    RateLimited,
    /// Other 4xx
    ClientError,
    /// 5xx
    ServerError,
    Timeout,
    Cors,
    Dns,
    Tls,
    /// No response received
    Connection,
}

impl NetworkErrorKind {
    /// Whether retrying can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetworkErrorKind::Connection
                | NetworkErrorKind::Timeout
                | NetworkErrorKind::ServerError
                | NetworkErrorKind::Dns
                | NetworkErrorKind::Offline
                | NetworkErrorKind::RateLimited
        )
    }

    /// Delay a caller should wait before retrying on its own
    pub fn suggested_delay(&self) -> Duration {
        match self {
            NetworkErrorKind::Connection => Duration::from_secs(2),
            NetworkErrorKind::Timeout => Duration::from_secs(3),
            NetworkErrorKind::ServerError => Duration::from_secs(5),
            NetworkErrorKind::Dns => Duration::from_secs(3),
            NetworkErrorKind::Offline => Duration::from_secs(1),
            NetworkErrorKind::RateLimited => Duration::from_secs(60),
            _ => Duration::from_secs(2),
        }
    }

    /// Short operator-facing hint, logged alongside the failure
    pub fn hint(&self) -> &'static str {
        match self {
            NetworkErrorKind::Offline => "check the internet connection",
            NetworkErrorKind::Unauthorized => "credentials are missing or expired",
            NetworkErrorKind::Forbidden => "the caller lacks permission",
            NetworkErrorKind::NotFound => "the resource does not exist",
            NetworkErrorKind::RateLimited => "too many requests, slow down",
            NetworkErrorKind::ClientError => "the request was rejected as invalid",
            NetworkErrorKind::ServerError => "the server failed, try again shortly",
            NetworkErrorKind::Timeout => "the connection may be slow",
            NetworkErrorKind::Cors => "the request was blocked by a cross-origin policy",
            NetworkErrorKind::Dns => "the host name could not be resolved",
            NetworkErrorKind::Tls => "the certificate could not be verified",
            NetworkErrorKind::Connection => "the server could not be reached",
        }
    }
}

/// Classifies network failures
pub trait NetworkErrorClassifier: Send + Sync {
    fn classify(&self, error: &RecoveryError) -> NetworkErrorKind;

    fn is_retryable(&self, kind: NetworkErrorKind) -> bool {
        kind.is_retryable()
    }
}

/// Shared online/offline flag toggled by the host
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    online: Arc<AtomicBool>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self {
            online: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            tracing::info!(online, "Connectivity changed");
        }
    }
}

/// Classifier that inspects status codes and error variants
#[derive(Debug, Clone, Default)]
pub struct DefaultNetworkClassifier {
    connectivity: ConnectivityMonitor,
}

impl DefaultNetworkClassifier {
    pub fn new(connectivity: ConnectivityMonitor) -> Self {
        Self { connectivity }
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }
}

impl NetworkErrorClassifier for DefaultNetworkClassifier {
    fn classify(&self, error: &RecoveryError) -> NetworkErrorKind {
        if !self.connectivity.is_online() {
            return NetworkErrorKind::Offline;
        }

        match error {
            RecoveryError::Http { status, .. } => match *status {
                401 => NetworkErrorKind::Unauthorized,
                403 => NetworkErrorKind::Forbidden,
                404 => NetworkErrorKind::NotFound,
                429 => NetworkErrorKind::RateLimited,
                400..=499 => NetworkErrorKind::ClientError,
                s if s >= 500 => NetworkErrorKind::ServerError,
                _ => NetworkErrorKind::Connection,
            },
            RecoveryError::Offline(_) => NetworkErrorKind::Offline,
            RecoveryError::Timeout(_) => NetworkErrorKind::Timeout,
            RecoveryError::Cors(_) => NetworkErrorKind::Cors,
            RecoveryError::Dns(_) => NetworkErrorKind::Dns,
            RecoveryError::Tls(_) => NetworkErrorKind::Tls,
            _ => NetworkErrorKind::Connection,
        }
    }
}

/// Tagged classification computed once per recovery call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClassification {
    Network {
        kind: NetworkErrorKind,
        retryable: bool,
    },
    Component,
    Unclassified,
}

impl ErrorClassification {
    /// Classify an error, honouring caller hints
    ///
    /// Network takes precedence over component when both apply.
    pub fn classify(
        classifier: &dyn NetworkErrorClassifier,
        error: &RecoveryError,
        network_hint: bool,
        component_hint: bool,
    ) -> Self {
        if network_hint || error.is_network() {
            let kind = classifier.classify(error);
            ErrorClassification::Network {
                kind,
                retryable: classifier.is_retryable(kind),
            }
        } else if component_hint || error.is_component() {
            ErrorClassification::Component
        } else {
            ErrorClassification::Unclassified
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RecoveryError::http(401, "x"), NetworkErrorKind::Unauthorized)]
    #[case(RecoveryError::http(403, "x"), NetworkErrorKind::Forbidden)]
    #[case(RecoveryError::http(404, "x"), NetworkErrorKind::NotFound)]
    #[case(RecoveryError::http(429, "x"), NetworkErrorKind::RateLimited)]
    #[case(RecoveryError::http(422, "x"), NetworkErrorKind::ClientError)]
    #[case(RecoveryError::http(503, "x"), NetworkErrorKind::ServerError)]
    #[case(RecoveryError::timeout("x"), NetworkErrorKind::Timeout)]
    #[case(RecoveryError::cors("x"), NetworkErrorKind::Cors)]
    #[case(RecoveryError::dns("x"), NetworkErrorKind::Dns)]
    #[case(RecoveryError::tls("x"), NetworkErrorKind::Tls)]
    #[case(RecoveryError::offline("x"), NetworkErrorKind::Offline)]
    #[case(RecoveryError::network("Network Error"), NetworkErrorKind::Connection)]
    fn test_default_classification(#[case] error: RecoveryError, #[case] expected: NetworkErrorKind) {
        let classifier = DefaultNetworkClassifier::default();
        assert_eq!(classifier.classify(&error), expected);
    }

    #[test]
    fn test_offline_flag_wins() {
        let connectivity = ConnectivityMonitor::new();
        let classifier = DefaultNetworkClassifier::new(connectivity.clone());

        connectivity.set_online(false);
        assert_eq!(
            classifier.classify(&RecoveryError::http(500, "x")),
            NetworkErrorKind::Offline
        );

        connectivity.set_online(true);
        assert_eq!(
            classifier.classify(&RecoveryError::http(500, "x")),
            NetworkErrorKind::ServerError
        );
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(NetworkErrorKind::RateLimited.is_retryable());
        assert!(NetworkErrorKind::Offline.is_retryable());
        assert!(!NetworkErrorKind::NotFound.is_retryable());
        assert!(!NetworkErrorKind::Tls.is_retryable());
        assert_eq!(
            NetworkErrorKind::RateLimited.suggested_delay(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_classification_hints() {
        let classifier = DefaultNetworkClassifier::default();
        let generic = RecoveryError::internal("boom");

        assert_eq!(
            ErrorClassification::classify(&classifier, &generic, false, false),
            ErrorClassification::Unclassified
        );
        assert_eq!(
            ErrorClassification::classify(&classifier, &generic, false, true),
            ErrorClassification::Component
        );
        assert_eq!(
            ErrorClassification::classify(&classifier, &generic, true, false),
            ErrorClassification::Network {
                kind: NetworkErrorKind::Connection,
                retryable: true
            }
        );
    }
}
