// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Failures of the durable workflow instance store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("instance store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode instance record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("instance store lock poisoned")]
    Poisoned,
}
