// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod clock;
pub mod downstream;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use downstream::{Downstream, DownstreamCall};
pub use store::InstanceStore;
