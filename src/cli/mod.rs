pub mod ascii_preview;

pub use ascii_preview::{check_for_escape, clear_screen, AsciiRenderer};
