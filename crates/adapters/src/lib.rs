// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rx-adapters: seams to the outside world — chat channel senders and the
//! Kubernetes cluster observer.

pub mod channel;
pub mod observe;

pub use channel::{ChannelError, ChannelRouter, ChannelSender};
pub use observe::{ClusterObserver, ClusterScan, KubeObserver, Observation, ObserveError, SubScan};

#[cfg(any(test, feature = "test-support"))]
pub use channel::fake::FakeChannelSender;
#[cfg(any(test, feature = "test-support"))]
pub use observe::fake::FakeObserver;
