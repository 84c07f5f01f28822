#![no_main]

mod utils;

use libfuzzer_sys::fuzz_target;
use peek_agent::format_message;

use utils::truncate_utf8;

fuzz_target!(|data: &[u8]| {
    let Some(template) = truncate_utf8(data) else {
        return;
    };
    let values = ["\"World\"".to_owned(), ":!".to_owned()];
    let message = format_message(template, &values);
    // Every output byte comes from the template or a value.
    assert!(message.len() <= template.len() * (values[0].len() + 1));
});
