// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Plugin hooks and contacts compiled into this binary.
//!
//! A plugin directory under `plugins/` binds to one of the hooks registered
//! here through the `module` key of its `hook.yml`. Distributions that ship
//! their own plugins or transports extend these registries.

use bastion_core::application::contact_registry::ContactRegistry;
use bastion_core::application::plugin_manager::HookRegistry;

pub fn hook_registry() -> HookRegistry {
    HookRegistry::new()
}

pub fn contact_registry() -> ContactRegistry {
    ContactRegistry::new()
}
