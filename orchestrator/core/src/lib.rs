// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Bastion Core
//!
//! Control plane of the Bastion agent orchestration server.
//!
//! # Architecture
//!
//! - **domain:** records, ports, and pure rules (trust expiry, schedule windows)
//! - **application:** the control plane components and their boot/teardown wiring
//! - **infrastructure:** in-memory stores, config files, event bus, report output

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::{ControlPlane, Layout, LoopTimings, Services};
