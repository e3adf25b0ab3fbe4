//! Terminal logging using env_logger
//!
//! Log lines go to stderr so that the process log printed on stdout can be
//! piped or redirected on its own. The level comes from `RUST_LOG` and
//! defaults to `info`.

use env_logger::{Builder, Env, Target};

pub fn init() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .format_timestamp_millis()
        .init();
}
