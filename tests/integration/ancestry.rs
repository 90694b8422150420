#![allow(missing_docs)]

mod common;

use chainquery::{ErrorKind, QueryError, Result};

#[test]
fn attributes_of_one_object_share_their_anchor() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let total = runs.get("exptime")?.mul(runs.get("nexp")?)?;
    assert_eq!(total.index_node(), runs.node());
    assert!(total.is_single());
    Ok(())
}

#[test]
fn independent_roots_are_disjoint() -> Result<()> {
    let session = common::session();
    let a = session.root().get("runs")?.get("exptime")?;
    let b = session.root().get("runs")?.get("nexp")?;
    let err = a.add(&b).unwrap_err();
    assert_eq!(err.code(), "Disjoint");
    assert_eq!(err.kind(), ErrorKind::Ancestry);
    Ok(())
}

#[test]
fn sibling_plural_branches_are_disjoint() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let left = obs.traverse_to("run", false)?.get("exptime")?;
    let right = obs.traverse_to("run", false)?.get("exptime")?;
    assert_eq!(left.sub(&right).unwrap_err().code(), "Disjoint");
    Ok(())
}

#[test]
fn singular_hops_stay_on_the_same_anchor() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let mjd = runs.get("mjd")?;
    let exptime = runs.get("exptime")?;
    let end = mjd.add(exptime.div(86400.0)?)?;
    assert_eq!(end.index_node(), runs.node());
    Ok(())
}

#[test]
fn ancestor_values_broadcast_onto_descendants() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let runs = obs.traverse_to("run", false)?;
    let obid = obs.get("obid")?;
    let runid = runs.get("runid")?;
    let combined = runid.add(&obid)?;
    assert_eq!(combined.index_node(), runs.node(), "finest grouping wins");

    let spectra = runs.traverse_to("spectrum", false)?;
    let snr = spectra.get("snr")?;
    let scaled = snr.mul(runs.get("exptime")?)?;
    assert_eq!(scaled.index_node(), spectra.node());
    Ok(())
}

#[test]
fn handles_from_other_sessions_are_rejected() -> Result<()> {
    let first = common::session();
    let second = common::session();
    let a = first.root().get("runs")?.get("exptime")?;
    let b = second.root().get("runs")?.get("exptime")?;
    assert_eq!(a.add(&b).unwrap_err(), QueryError::DifferentSession);
    assert_eq!(first.explain(&b).unwrap_err(), QueryError::DifferentSession);
    Ok(())
}

#[test]
fn filters_need_an_ancestor_predicate() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let good = runs.get("good")?;
    let kept = runs.filter(&good)?;
    assert_eq!(kept.object_type(), Some("run"));
    let exptime = kept.get("exptime")?;
    assert_eq!(exptime.index_node(), kept.node());

    let other = session.root().get("runs")?.get("good")?;
    let err = runs.filter(&other).unwrap_err();
    assert_eq!(err.code(), "NotAncestor");
    Ok(())
}

#[test]
fn aggregation_needs_an_ancestor() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let runs = obs.traverse_to("run", false)?;
    let per_ob = runs.get("exptime")?.sum(Some(&obs))?;
    assert_eq!(per_ob.index_node(), obs.node());
    let per_ob_and_id = per_ob.add(obs.get("obid")?)?;
    assert_eq!(per_ob_and_id.index_node(), obs.node());

    let unrelated = session.root().get("runs")?;
    assert_eq!(
        runs.get("exptime")?.sum(Some(&unrelated)).unwrap_err().kind(),
        ErrorKind::Ancestry
    );
    Ok(())
}
