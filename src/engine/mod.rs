pub mod reconcile;
pub mod telemetry;
pub mod view;
pub mod window;

pub use reconcile::{Command, Reply, Session, SessionInput, SessionIo, SessionSettings};
