#![allow(dead_code)]

use std::sync::{Arc, Once};

use chainquery::{InMemorySchema, QueryOptions, Session, ValueKind};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("chainquery=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

/// Observation blocks own many runs; each run has one exposure and many
/// spectra; spectra carry a binary flux and may point at an adjunct
/// spectrum.
pub fn survey_schema() -> InMemorySchema {
    InMemorySchema::new()
        .with_object("ob")
        .with_identity("ob", "obid")
        .with_attribute("ob", "name", Some(ValueKind::String))
        .with_object("run")
        .with_identity("run", "runid")
        .with_attribute("run", "exptime", Some(ValueKind::Float))
        .with_attribute("run", "nexp", Some(ValueKind::Integer))
        .with_attribute("run", "good", Some(ValueKind::Boolean))
        .with_object("exposure")
        .with_attribute("exposure", "mjd", Some(ValueKind::Float))
        .with_object_plural("spectrum", "spectra")
        .with_identity("spectrum", "specid")
        .with_attribute("spectrum", "snr", Some(ValueKind::Float))
        .with_product("spectrum", "flux")
        .with_relation("ob", "run", false, true)
        .with_relation("run", "exposure", true, false)
        .with_relation("run", "spectrum", false, true)
        .with_labelled_relation("spectrum", "spectrum", "adjunct", true)
}

pub fn session() -> Session {
    init_tracing();
    Session::new(survey_schema())
}

pub fn session_with(options: QueryOptions) -> Session {
    init_tracing();
    Session::with_options(Arc::new(survey_schema()), options)
}
