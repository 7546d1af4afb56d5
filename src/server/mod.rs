mod assets;
pub mod http;
pub mod markdown;

pub use http::{router, AppState, Server};
pub use markdown::render_markdown;
