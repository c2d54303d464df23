pub mod jobs;
pub mod store;

use serde::Serialize;

pub(crate) fn print_json(payload: &impl Serialize) {
    match serde_json::to_string_pretty(payload) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("error: failed to render JSON output: {e}"),
    }
}
