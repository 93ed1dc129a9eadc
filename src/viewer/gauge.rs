//! Waiting for the viewer pane to have a usable size

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{debug, warn};

use super::error::RenderError;
use super::types::Size;

/// Reports the current size of the pane pages are fit into
pub trait ContainerGauge: Send + Sync {
    fn measure(&self) -> Size;
}

/// Gauge whose size is pushed by whoever lays out the pane
#[derive(Debug, Default)]
pub struct PaneGauge {
    size: Mutex<Size>,
}

impl PaneGauge {
    pub fn new(size: Size) -> Self {
        Self {
            size: Mutex::new(size),
        }
    }

    pub fn set(&self, size: Size) {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner) = size;
    }
}

impl ContainerGauge for PaneGauge {
    fn measure(&self) -> Size {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Measure the pane, retrying every `interval` while it has no positive
/// size. Gives up after `retries` further attempts.
pub async fn wait_for_container(
    gauge: &dyn ContainerGauge,
    interval: Duration,
    retries: u32,
) -> Result<Size, RenderError> {
    for attempt in 0..=retries {
        let size = gauge.measure();
        if size.is_positive() {
            return Ok(size);
        }
        if attempt < retries {
            debug!("Viewer pane not laid out yet ({size:?}), retry {}", attempt + 1);
            tokio::time::sleep(interval).await;
        }
    }
    warn!("Viewer pane still has no size after {} attempts", retries + 1);
    Err(RenderError::ContainerUnavailable {
        attempts: retries + 1,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Zero size until the given number of measurements happened
    struct LateGauge {
        calls: AtomicU32,
        ready_after: u32,
    }

    impl ContainerGauge for LateGauge {
        fn measure(&self) -> Size {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if calls > self.ready_after {
                Size::new(800.0, 600.0)
            } else {
                Size::default()
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_layout() {
        let gauge = Arc::new(LateGauge {
            calls: AtomicU32::new(0),
            ready_after: 3,
        });
        let start = tokio::time::Instant::now();

        let size = wait_for_container(gauge.as_ref(), Duration::from_millis(100), 10)
            .await
            .unwrap();

        assert_eq!(size, Size::new(800.0, 600.0));
        assert_eq!(gauge.calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_bound() {
        let gauge = PaneGauge::default();
        let start = tokio::time::Instant::now();

        let err = wait_for_container(&gauge, Duration::from_millis(100), 10)
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::ContainerUnavailable { attempts: 11 }));
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn laid_out_pane_answers_immediately() {
        let gauge = PaneGauge::new(Size::new(10.0, 10.0));
        assert!(wait_for_container(&gauge, Duration::from_secs(60), 0).await.is_ok());
    }
}
