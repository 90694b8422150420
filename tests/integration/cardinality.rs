#![allow(missing_docs)]

mod common;

use chainquery::{ErrorKind, QueryKind, Result};

#[test]
fn singular_path_gives_singular_handle() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let exposure = runs.traverse_to("exposure", true)?;
    assert!(exposure.is_single(), "run has exactly one exposure");
    assert_eq!(exposure.object_type(), Some("exposure"));

    let obs = session.root().get("obs")?;
    let err = obs.traverse_to("run", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cardinality);
    assert_eq!(err.code(), "NotSingular");
    Ok(())
}

#[test]
fn plural_traversal_is_allowed_along_any_path() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let exposures = obs.get("exposures")?;
    assert!(!exposures.is_single());
    assert_eq!(exposures.names(), &["exposures"]);
    let spectra = exposures.traverse_to("spectrum", false)?;
    assert_eq!(spectra.object_type(), Some("spectrum"));
    Ok(())
}

#[test]
fn foreign_attribute_traverses_to_owner() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let mjd = runs.select_attribute("mjd", true)?;
    assert_eq!(mjd.object_type(), Some("exposure"));
    assert!(mjd.is_single());
    assert_eq!(mjd.index_node(), runs.node(), "indexed by the runs it was read for");
    let exposure = mjd.previous().expect("mjd is read from an exposure handle");
    assert_eq!(exposure.object_type(), Some("exposure"));
    Ok(())
}

#[test]
fn explicit_singular_attribute_must_be_provable() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    for name in ["mjds", "exptimes"] {
        let err = obs.select_attribute(name, true).unwrap_err();
        assert_eq!(err.code(), "NotSingular", "{name} lies behind the plural ob -> run link");
        assert_eq!(err.kind(), ErrorKind::Cardinality);
    }
    let mjds = obs.select_attribute("mjds", false)?;
    assert!(!mjds.is_single());
    assert_eq!(mjds.object_type(), Some("exposure"));

    let runs = session.root().get("runs")?;
    let err = runs.select_attribute("exptimes", true).unwrap_err();
    assert_eq!(err.code(), "NotSingular");
    assert!(runs.select_attribute("exptime", true)?.is_single());
    Ok(())
}

#[test]
fn singular_attribute_through_plural_path_is_rejected() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let err = obs.get("mjd").unwrap_err();
    assert_eq!(err.code(), "PluralOwner");
    assert_eq!(err.kind(), ErrorKind::Cardinality);

    let mjds = obs.get("mjds")?;
    assert!(!mjds.is_single());
    assert_eq!(mjds.factor_name(), Some("mjd"));
    Ok(())
}

#[test]
fn identity_lookup_is_always_single() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let ob = obs.by_id(1234)?;
    assert!(ob.is_single());
    assert_eq!(ob.object_type(), Some("ob"));
    assert_eq!(ob.names(), &["ob"]);

    let runs = obs.traverse_to("run", false)?;
    let some_runs = runs.by_ids([1_i64, 2, 3])?;
    assert!(some_runs.is_single());
    let params = session.parameters_for(&some_runs)?;
    assert_eq!(params.len(), 1, "ids are bound as a single list parameter");
    Ok(())
}

#[test]
fn root_rejects_singular_names() {
    let session = common::session();
    let root = session.root();
    for name in ["ob", "run", "exptime", "adjunct"] {
        let err = root.get(name).unwrap_err();
        assert_eq!(err.code(), "SingularStart", "{name}");
    }
    assert_eq!(root.traverse_to("runs", true).unwrap_err().code(), "SingularStart");
}

#[test]
fn relation_labels_are_followed() -> Result<()> {
    let session = common::session();
    let spectra = session.root().get("spectra")?;
    let adjunct = spectra.get("adjunct")?;
    assert!(adjunct.is_single());
    assert_eq!(adjunct.object_type(), Some("spectrum"));
    assert_eq!(adjunct.names(), &["adjunct"]);
    assert!(session.explain(&adjunct)?.contains("getitem .relation_id"));

    let adjuncts = session.root().get("adjuncts")?;
    assert!(matches!(adjuncts.kind(), QueryKind::Object));
    assert_eq!(
        session.root().get("runs")?.traverse_to_relative("adjunct", true).unwrap_err().code(),
        "UnknownRelation"
    );
    Ok(())
}

#[test]
fn one_row_flag_follows_the_index() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let per_run = runs.get("exptime")?.precompile()?;
    assert!(!per_run.one_row());
    assert!(per_run.one_column());

    let overall = runs.get("exptime")?.max(None)?.precompile()?;
    assert!(overall.one_row());

    let one = runs.by_id(7)?.get("exptime")?.precompile()?;
    assert!(!one.one_row(), "rows are still per matching run");
    Ok(())
}
