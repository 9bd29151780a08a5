// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown handling

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;

/// Shutdown coordinator
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    shutdown_flag: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        if !self.shutdown_flag.swap(true, Ordering::Relaxed) {
            log::info!("[ShutdownCoordinator] Shutdown requested");
        }
    }

    /// Wait for Ctrl-C, then request shutdown
    pub async fn wait_for_shutdown_signal(&self) -> std::io::Result<()> {
        signal::ctrl_c().await?;
        self.shutdown();
        Ok(())
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown_flag),
        }
    }
}

/// Handle for checking shutdown
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// A handle that is never triggered
    pub fn detached() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
