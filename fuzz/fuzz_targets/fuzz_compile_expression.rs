#![no_main]

mod utils;

use libfuzzer_sys::fuzz_target;
use peek_eval::{compile_with_mode, ValidationMode};

use utils::truncate_utf8;

// Compilation must reject or accept any input without panicking, in both
// validation modes.
fuzz_target!(|data: &[u8]| {
    let Some(text) = truncate_utf8(data) else {
        return;
    };
    let _ = compile_with_mode(text, ValidationMode::Strict);
    let _ = compile_with_mode(text, ValidationMode::Relaxed);
});
