// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod ability_watcher;
pub mod contact_registry;
pub mod control_plane;
pub mod launcher;
pub mod plugin_manager;
pub mod queries;
pub mod requirements;
pub mod resumer;
pub mod scheduler;
pub mod services;
pub mod shutdown;
pub mod supervisor;
pub mod trust_monitor;

pub use control_plane::{BootReport, ControlPlane, LoopTimings};
pub use services::{Layout, Services};
