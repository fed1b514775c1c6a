pub mod answer_composer;
pub mod observer;
pub mod query_executor;
pub mod query_writer;
pub mod runner;
pub mod state;

pub use answer_composer::*;
pub use observer::*;
pub use query_executor::*;
pub use query_writer::*;
pub use runner::*;
pub use state::*;
