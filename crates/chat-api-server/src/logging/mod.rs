//! Tracing subscriber setup (stdout plus optional rolling file)

mod subscriber;

pub use subscriber::init_logger;
