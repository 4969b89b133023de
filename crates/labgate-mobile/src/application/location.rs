//! Bounded device location capture.
//!
//! Platform geolocation reads block and can hang; [`capture_location`] runs
//! the provider on a blocking thread and enforces the configured deadline on
//! top of the provider's own timeout handling. The sample's accuracy is
//! graded for display but never gates anything.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use labgate_core::{LocationError, LocationProvider, LocationSample};

/// Slack on top of the provider's own timeout before the wrapper gives up.
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

/// Captures one high-accuracy location sample within `capture_timeout`.
///
/// # Errors
///
/// The provider's [`LocationError`], or [`LocationError::Timeout`] when the
/// read outlives the deadline.
pub async fn capture_location(
    provider: Arc<dyn LocationProvider>,
    capture_timeout: Duration,
) -> Result<LocationSample, LocationError> {
    let read = tokio::task::spawn_blocking(move || provider.capture(capture_timeout));

    match timeout(capture_timeout + DEADLINE_GRACE, read).await {
        Ok(Ok(result)) => {
            if let Ok(sample) = &result {
                debug!(
                    accuracy_meters = sample.accuracy_meters(),
                    grade = ?sample.accuracy_grade(),
                    "location captured"
                );
            }
            result
        }
        Ok(Err(join_err)) => {
            warn!("location capture task failed: {join_err}");
            Err(LocationError::Unavailable)
        }
        Err(_elapsed) => Err(LocationError::Timeout),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct InstantProvider;
    impl LocationProvider for InstantProvider {
        fn capture(&self, _timeout: Duration) -> Result<LocationSample, LocationError> {
            LocationSample::new(52.0, 11.0, 4.0, 1).map_err(|_| LocationError::Unavailable)
        }
    }

    struct DeniedProvider;
    impl LocationProvider for DeniedProvider {
        fn capture(&self, _timeout: Duration) -> Result<LocationSample, LocationError> {
            Err(LocationError::PermissionDenied)
        }
    }

    struct HangingProvider;
    impl LocationProvider for HangingProvider {
        fn capture(&self, _timeout: Duration) -> Result<LocationSample, LocationError> {
            std::thread::sleep(Duration::from_secs(5));
            Err(LocationError::Unavailable)
        }
    }

    #[tokio::test]
    async fn test_capture_returns_the_provider_sample() {
        let sample = capture_location(Arc::new(InstantProvider), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(sample.accuracy_meters(), 4.0);
    }

    #[tokio::test]
    async fn test_permission_denial_passes_through() {
        let result = capture_location(Arc::new(DeniedProvider), Duration::from_secs(1)).await;
        assert_eq!(result, Err(LocationError::PermissionDenied));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_hung_provider_times_out_at_the_deadline() {
        // Deadline = 100 ms + grace; the provider sleeps 5 s.
        let start = std::time::Instant::now();
        let result =
            capture_location(Arc::new(HangingProvider), Duration::from_millis(100)).await;
        assert_eq!(result, Err(LocationError::Timeout));
        assert!(start.elapsed() < Duration::from_secs(3));
    }
}
