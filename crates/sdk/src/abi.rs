// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry-point ABI between the worker and a plugin cdylib.
//!
//! The worker and every plugin link the same `ddk-sdk`; the trait objects
//! exchanged here share that single definition while each plugin keeps its
//! transitive dependencies private to its own library. The loader refuses a
//! plugin whose `sdk_version` differs from the worker's.

use crate::plugin::Plugin;

/// SDK version baked into both sides of the boundary.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// What a plugin's entry symbol returns.
pub struct PluginDecl {
    /// `SDK_VERSION` of the sdk the plugin was compiled against.
    pub sdk_version: &'static str,
    /// Constructs the plugin instance.
    pub create: fn() -> Box<dyn Plugin>,
}

/// Declare the plugin entry point.
///
/// ```ignore
/// ddk_sdk::declare_plugin!(|| MyPlugin::new());
/// ```
///
/// Expands to the `ddk_plugin_entry` symbol the worker's loader resolves.
#[macro_export]
macro_rules! declare_plugin {
    ($ctor:expr) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn ddk_plugin_entry() -> $crate::abi::PluginDecl {
            $crate::abi::PluginDecl {
                sdk_version: $crate::abi::SDK_VERSION,
                create: || Box::new(($ctor)()),
            }
        }
    };
}

/// Signature of the entry symbol, shared with the loader.
pub type PluginEntryFn = extern "C" fn() -> PluginDecl;
