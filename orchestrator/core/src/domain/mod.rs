// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain model of the control plane: aggregates, value objects, and the
//! ports the application layer depends on.

pub mod ability;
pub mod agent;
pub mod clock;
pub mod contact;
pub mod error_log;
pub mod events;
pub mod knowledge;
pub mod objective;
pub mod operation;
pub mod plugin;
pub mod repository;
pub mod schedule;
pub mod server_config;
