use std::sync::{Arc, OnceLock};

use peek_config::{init_tracing, LogBuffer, PeekConfig};

static PANIC_HOOK: OnceLock<()> = OnceLock::new();

/// Initialize structured logging and install a process-wide panic hook.
///
/// Evaluation workers catch their own panics; the hook only records panics
/// that escape elsewhere in the agent. Safe to call more than once.
pub fn init(config: &PeekConfig) -> Arc<LogBuffer> {
    let buffer = init_tracing(&config.logging);
    install_panic_hook();
    buffer
}

fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if cfg!(debug_assertions) {
                previous(info);
            }
            let location = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .unwrap_or_else(|| "<unknown>".to_owned());
            tracing::error!(
                target: "peek.panic",
                location = %location,
                "panic: {}",
                panic_message(info)
            );
        }));
    });
}

fn panic_message(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}
