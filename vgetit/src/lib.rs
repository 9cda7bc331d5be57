// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

pub use handlers::{
    load_keys_from_file, load_keys_from_source, parse_key_line, render_job_line,
    render_target_details,
};
