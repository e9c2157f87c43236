// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

pub use handlers::{
    ClassifyOutput, ClassifyOverrides, Console, PasswordInput, authenticate, classify_output,
    default_archive_path, edit_password, load_config, normalize_lines, wants_json_output,
    write_archive, write_default_config,
};
