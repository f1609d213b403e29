pub mod commands;
pub mod handlers;
pub mod server;

// Re-export commonly used handler functions for convenience
pub use handlers::{load_urls_from_file, load_urls_from_source, parse_url_line};

pub use server::{AppState, create_router};

// Re-export resolve functionality from sitewalk-core
pub use sitewalk_core::resolve::{
    ResolveOptions, ResolveProgressCallback, execute_resolve, extract_url_path,
};
