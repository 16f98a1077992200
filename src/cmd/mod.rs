mod compare_cmd;
mod schema;

pub use compare_cmd::*;
pub use schema::*;
