//! Logger setup (`SPEC_FULL.md` §B): `env_logger` with per-target filter
//! directives, in the spirit of `bin/oe/logger` but without the
//! rotating-file/JSON machinery an operator-facing node doesn't need here.

use std::io::Write;

/// Initializes the global logger. `RUST_LOG` overrides the default
/// directive string when set, the same precedence `env_logger` always
/// applies.
pub fn init() {
    let mut builder = env_logger::Builder::new();
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}: {}",
            buf.timestamp_millis(),
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder.parse_filters(
        &std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "info,tokio_tungstenite=warn,tungstenite=warn,mio=warn".to_string()
        }),
    );
    let _ = builder.try_init();
}
