#![allow(missing_docs)]

mod common;

use chainquery::{AlignItem, AlignedQuery, ErrorKind, QueryError, QueryKind, Result};

#[test]
fn anchor_is_the_finest_shared_handle() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let runs = obs.traverse_to("run", false)?;
    let spectra = runs.traverse_to("spectrum", false)?;
    let aligned = AlignedQuery::new([
        ("exptime", runs.get("exptime")?),
        ("snr", spectra.get("snr")?),
        ("ob", obs.get("obid")?),
    ])?;
    assert!(aligned.anchor().same_as(&obs), "obid only descends from obs");
    assert_eq!(aligned.items().len(), 3);

    let table = aligned.precompile()?;
    assert_eq!(table.names(), &["exptime", "snr", "ob"]);
    let QueryKind::Table { collected, .. } = table.kind() else {
        panic!("aligned queries precompile to tables");
    };
    assert_eq!(collected, &vec![true, true, false]);
    Ok(())
}

#[test]
fn objects_align_through_their_default_attribute() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let exposure = runs.traverse_to("exposure", true)?;
    let aligned = AlignedQuery::new([
        AlignItem::from(runs.get("exptime")?),
        AlignItem::from(exposure.get("mjd")?),
        AlignItem::from(("when", exposure.clone())),
    ])?;
    assert!(aligned.anchor().same_as(&runs));
    let table = aligned.precompile()?;
    assert_eq!(table.names(), &["exptime", "mjd", "when"]);
    Ok(())
}

#[test]
fn expression_of_a_member_aligns_on_its_object() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let exptime = runs.get("exptime")?;
    let doubled = exptime.mul(2.0)?;
    let aligned = AlignedQuery::new([("t", exptime.clone()), ("t2", doubled)])?;
    assert!(aligned.anchor().same_as(&runs), "attribute vertices never group rows");
    let table = aligned.precompile()?;
    assert_eq!(table.names(), &["t", "t2"]);
    assert!(table.previous().expect("built from the anchor").same_as(&runs));
    Ok(())
}

#[test]
fn combined_member_aligns_above_its_broadcast_anchor() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let obid = obs.get("obid")?;
    let exptimes = obs.traverse_to("run", false)?.get("exptime")?;
    let mixed = obid.add(&exptimes)?;
    let aligned = AlignedQuery::new([("m", mixed), ("id", obid)])?;
    assert!(aligned.anchor().same_as(&obs));
    let table = aligned.precompile()?;
    assert_eq!(table.names(), &["m", "id"]);
    let QueryKind::Table { collected, .. } = table.kind() else {
        panic!("aligned queries precompile to tables");
    };
    assert_eq!(collected, &vec![true, false]);
    Ok(())
}

#[test]
fn unrelated_members_have_no_useful_anchor() -> Result<()> {
    let session = common::session();
    let a = session.root().get("runs")?.get("exptime")?;
    let b = session.root().get("obs")?.get("obid")?;
    let aligned = AlignedQuery::new([a, b])?;
    assert!(matches!(aligned.anchor().kind(), QueryKind::Root));
    assert_eq!(aligned.anchor().node(), session.root().node());
    Ok(())
}

#[test]
fn table_members_get_suffixed_columns() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let first = runs.select_many(["runid", "exptime"])?;
    let second = runs.select_many(["runid", "exptime"])?;
    let table = AlignedQuery::new([AlignItem::from(first), AlignItem::from(second)])?.precompile()?;
    assert_eq!(table.names(), &["runid_0", "exptime_0", "runid_1", "exptime_1"]);
    Ok(())
}

#[test]
fn members_must_all_be_tables_or_none() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let table = runs.select_many(["runid"])?;
    let aligned = AlignedQuery::new([("t", table), ("x", runs.get("exptime")?)])?;
    let err = aligned.precompile().unwrap_err();
    assert_eq!(err, QueryError::MixedTableItems);
    assert_eq!(err.kind(), ErrorKind::Value);
    Ok(())
}

#[test]
fn members_must_share_a_session() -> Result<()> {
    let first = common::session();
    let second = common::session();
    let a = first.root().get("runs")?;
    let b = second.root().get("runs")?;
    assert_eq!(AlignedQuery::new([a, b]).unwrap_err(), QueryError::DifferentSession);
    let empty: Vec<AlignItem<'_>> = Vec::new();
    assert!(AlignedQuery::new(empty).is_err());
    Ok(())
}
