pub mod logging;
pub mod time;
pub mod transport;
pub mod types;

pub use tracing;

#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
