pub mod buffer;
pub mod stream;
pub mod thread;
mod util;
pub mod ws;
