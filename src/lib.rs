//! tracegrid core library: loads per-run performance logs, aligns them on a
//! relative timeline and renders side-by-side comparison grids.

mod cmd;
mod config;
mod grid;
mod logfile;
mod metric;
mod platform;
mod render;
mod run;
mod runtime;

pub use cmd::*;
pub use config::*;
pub use grid::*;
pub use logfile::*;
pub use metric::*;
pub use platform::*;
pub use render::*;
pub use run::*;
pub use runtime::*;
