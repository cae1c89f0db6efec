// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;
use thiserror::Error;

use crate::circuit::CircuitState;
use crate::types::DependencyId;

/// A call was denied because the dependency's circuit does not admit it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{dependency}' is {state:?}; call denied")]
pub struct CircuitOpen {
    pub dependency: DependencyId,
    pub state: CircuitState,
}

/// A dependency identifier that is not part of the registered set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown dependency '{0}'")]
pub struct UnknownDependency(pub String);

/// Result of running a call through a circuit guard.
#[derive(Debug, Error)]
pub enum GuardedCallError<E> {
    #[error(transparent)]
    CircuitOpen(CircuitOpen),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("call failed: {0}")]
    Failed(E),
}
