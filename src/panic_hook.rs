//! Global panic hook that routes panics through `tracing`.
//!
//! A worker task panicking (rather than returning a fatal [`crate::error::WlmError`])
//! should still be visible in the logs before its `JoinHandle` reports the panic
//! to the caller awaiting the shared executor's drain.

use std::panic::{PanicHookInfo, take_hook};

/// Install a global panic hook that logs panics via `tracing::error!`.
pub fn install() {
    let previous_hook = take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        let payload = panic_payload_to_string(panic_info);
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "<unknown>".to_string());

        tracing::error!(target: "modelmux::panic", location = %location, "{payload}");

        previous_hook(panic_info);
    }));
}

fn panic_payload_to_string(panic_info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = panic_info.payload().downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        return s.clone();
    }
    panic_info.to_string()
}
