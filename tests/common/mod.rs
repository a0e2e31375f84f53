#![allow(dead_code, unused_imports)]

pub mod callbacks;
pub mod session;

pub use callbacks::{as_callback, collecting_sink, failing, MockContext, RecordingCallback};
pub use session::{MockControl, MockSession, SessionEvent};

/// Route library logs to the test output, honouring RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
