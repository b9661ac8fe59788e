//! Work left over once a race is decided.
//!
//! A losing daemon may finish within its grace period so its cache stays warm,
//! and a rejected daemon gets reset. Neither can change the outcome, so both
//! run after the caller has reported it. Dropping a [`Cleanup`] cancels
//! whatever is still pending.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use blunt_core::CheckerInvocation;
use tokio::task::JoinHandle;

pub(crate) type Lingering = Pin<Box<dyn Future<Output = CheckerInvocation> + Send>>;

#[derive(Default)]
pub struct Cleanup {
    lingering: Option<(Lingering, Duration)>,
    resets: Vec<JoinHandle<()>>,
}

impl Cleanup {
    /// Keep a losing daemon alive for up to `grace`. A zero grace cancels it now.
    pub(crate) fn linger(&mut self, daemon: Lingering, grace: Duration) {
        if grace.is_zero() {
            return;
        }
        self.lingering = Some((daemon, grace));
    }

    pub(crate) fn reset(&mut self, handle: JoinHandle<()>) {
        self.resets.push(handle);
    }

    pub fn is_empty(&self) -> bool {
        self.lingering.is_none() && self.resets.is_empty()
    }

    /// Wait out the grace period and every daemon reset.
    pub async fn finish(mut self) {
        if let Some((mut daemon, grace)) = self.lingering.take() {
            match tokio::time::timeout(grace, &mut daemon).await {
                Ok(invocation) => tracing::debug!(
                    duration_ms = invocation.duration_ms,
                    "daemon caught up after losing"
                ),
                Err(_) => tracing::debug!("daemon still busy after grace period; cancelling"),
            }
        }
        for reset in std::mem::take(&mut self.resets) {
            if let Err(err) = reset.await {
                if !err.is_cancelled() {
                    tracing::warn!(error = %err, "daemon reset task failed");
                }
            }
        }
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        for reset in &self.resets {
            reset.abort();
        }
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup")
            .field("lingering", &self.lingering.as_ref().map(|(_, grace)| grace))
            .field("resets", &self.resets.len())
            .finish()
    }
}
