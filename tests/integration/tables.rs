#![allow(missing_docs)]

mod common;

use chainquery::{QueryError, QueryKind, Result, TableItem, TableValue};

fn collected(table: &chainquery::QueryHandle<'_>) -> Vec<bool> {
    match table.kind() {
        QueryKind::Table { collected, .. } => collected.clone(),
        other => panic!("expected a table, found {}", other.name()),
    }
}

#[test]
fn names_handles_and_renamed_expressions() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let obid = obs.get("obid")?;
    let exposure_time = obs.traverse_to("run", false)?.get("exptime")?.sum(Some(&obs))?;
    let table = obs.select_many([
        TableItem::from("name"),
        TableItem::from(&obid),
        TableItem::renamed("total", obid.add(&exposure_time)?),
    ])?;
    assert_eq!(table.names(), &["name", "obid", "total"]);
    assert_eq!(collected(&table), vec![false, false, false]);
    assert!(table.previous().expect("built from obs").same_as(&obs));
    Ok(())
}

#[test]
fn column_lookup_is_idempotent() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let table = runs.select_many(["runid", "exptime"])?;
    let first = table.get("exptime")?;
    let second = table.get("exptime")?;
    assert!(first.same_as(&second));
    assert_eq!(first.node(), second.node());
    assert_eq!(table.get("mjd").unwrap_err().code(), "UnknownColumn");
    Ok(())
}

#[test]
fn concatenation_keeps_original_columns() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let left = obs.select_many(["name"])?;
    let right = obs.select_many(["obid", "exptimes"])?;
    let joined = left.concat(&right)?;
    assert_eq!(joined.names(), &["name", "obid", "exptimes"]);
    for original in [&left, &right] {
        for name in original.names() {
            assert!(joined.column(name)?.same_as(&original.column(name)?), "{name}");
        }
    }
    assert_eq!(collected(&joined), vec![false, false, true]);
    Ok(())
}

#[test]
fn concatenation_reports_collisions() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let left = obs.select_many(["name", "obid"])?;
    let right = obs.select_many(["obid", "name"])?;
    match left.concat(&right).unwrap_err() {
        QueryError::ColumnCollision { names } => assert_eq!(names, vec!["name", "obid"]),
        other => panic!("unexpected error {other}"),
    }
    let renamed = obs.select_many([TableItem::renamed("other_", right.clone())])?;
    assert_eq!(renamed.names(), &["other_obid", "other_name"]);
    assert!(left.concat(&renamed).is_ok());
    Ok(())
}

#[test]
fn concatenation_needs_the_same_base() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let runs = obs.traverse_to("run", false)?;
    let left = obs.select_many(["name"])?;
    let right = runs.select_many(["runid"])?;
    assert_eq!(left.concat(&right).unwrap_err(), QueryError::TableIndexMismatch);
    Ok(())
}

#[test]
fn plural_columns_are_collected() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let table = runs.select_many(["runid", "snrs"])?;
    assert_eq!(collected(&table), vec![false, true]);
    assert!(!table.one_row());
    Ok(())
}

#[test]
fn select_all_reads_declared_attributes() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let all = runs.get("*")?;
    assert_eq!(all.names(), &["runid", "exptime", "nexp", "good"]);

    let reachable = runs.get("**")?;
    assert_eq!(
        reachable.names(),
        &["runid", "exptime", "nexp", "good", "ob.obid", "ob.name", "exposure.mjd"]
    );
    assert!(collected(&reachable).iter().all(|c| !c));
    Ok(())
}

#[test]
fn product_columns_are_flagged() -> Result<()> {
    let session = common::session();
    let spectra = session.root().get("spectra")?;
    let table = spectra.select_many(["specid", "flux"])?;
    assert_eq!(table.is_products(), &[false, true]);
    Ok(())
}

#[test]
fn tables_of_ids_filter_instead() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let picked = obs.select_many([1_i64, 2, 3])?;
    assert!(matches!(picked.kind(), QueryKind::Object));
    assert!(picked.is_single());
    Ok(())
}

#[test]
fn table_variables_expose_their_columns() -> Result<()> {
    let session = common::session();
    let table = TableValue::new(["runid", "weight"])
        .with_row([1, 10])
        .with_row([2, 20]);
    let rows = session.root().table_variable(table)?;
    let all = rows.precompile()?;
    assert_eq!(all.names(), &["runid", "weight"]);

    let weight = rows.get("weight")?;
    let doubled = weight.mul(2)?;
    assert_eq!(doubled.index_node(), rows.node());
    assert_eq!(rows.traverse_to("run", false).unwrap_err().code(), "Unsupported");
    assert_eq!(rows.get("mjd").unwrap_err().code(), "UnknownColumn");

    let params = session.parameters_for(&all)?;
    assert_eq!(params.len(), 1);
    Ok(())
}
