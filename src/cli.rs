//! CLI domain: parse, route, output, and presentation only.
//! Routes drive a [`SyncSession`](crate::session::SyncSession); no sync logic lives here.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_catalog_table, format_palette, format_projects_table, format_resolved_runtime,
    format_status_line,
};
pub use route::RunContext;
