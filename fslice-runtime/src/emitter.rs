//! The provenance trace sink: a line-oriented writer, gated by an
//! environment variable so linking the runtime into a program doesn't by
//! itself flood stderr.

use std::env;
use std::io::{self, Write};

const TRACE_ENV_VAR: &str = "FSLICE_TRACE";

/// Default sink: standard error, matching the runtime's documented default.
pub(crate) fn default_sink() -> Box<dyn Write + Send> {
    Box::new(io::stderr())
}

/// Whether trace lines should be written at all. Gated by `FSLICE_TRACE`,
/// on by default so a program linked against this runtime traces out of the
/// box; set `FSLICE_TRACE=0` to link the runtime in without the output.
pub(crate) fn trace_enabled_from_env() -> bool {
    match env::var(TRACE_ENV_VAR) {
        Ok(value) => value != "0",
        Err(_) => true,
    }
}
