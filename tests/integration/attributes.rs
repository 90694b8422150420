#![allow(missing_docs)]

mod common;

use chainquery::{ErrorKind, QueryError, QueryOptions, Result, Value, ValueKind};

fn exported(session: &chainquery::Session, handle: &chainquery::QueryHandle<'_>) -> String {
    session.export_json(handle).expect("export").to_string()
}

#[test]
fn comparisons_return_booleans() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let exptime = runs.get("exptime")?;
    let long = exptime.gt(30)?;
    assert_eq!(long.value_kind(), Some(ValueKind::Boolean));
    assert!(exported(&session, &long).contains("{0} > toFloat($param0)"));
    assert_eq!(
        session.parameters_for(&long)?,
        vec![("$param0".to_owned(), Value::Int(30))]
    );
    Ok(())
}

#[test]
fn booleans_are_coerced_for_arithmetic() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let weighted = runs.get("nexp")?.mul(runs.get("good")?)?;
    assert_eq!(weighted.value_kind(), Some(ValueKind::Integer));
    assert!(exported(&session, &weighted).contains("{0} * toInteger({1})"));

    let ratio = runs.get("nexp")?.div(runs.get("exptime")?)?;
    assert_eq!(ratio.value_kind(), Some(ValueKind::Float));
    Ok(())
}

#[test]
fn integer_logic_is_bitwise_and_boolean_logic_is_not() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let nexp = runs.get("nexp")?;
    let masked = nexp.and(3_i64)?;
    assert_eq!(masked.value_kind(), Some(ValueKind::Integer));
    assert!(exported(&session, &masked).contains("apoc.bitwise.op"));

    let both = runs.get("good")?.and(nexp.gt(2)?)?;
    assert_eq!(both.value_kind(), Some(ValueKind::Boolean));
    assert!(exported(&session, &both).contains("{0} and {1}"));
    Ok(())
}

#[test]
fn string_patterns_compile_to_regex() -> Result<()> {
    let session = common::session();
    let obs = session.root().get("obs")?;
    let name = obs.get("name")?;
    let globbed = name.eq("ob*")?;
    assert!(exported(&session, &globbed).contains("=~"));
    assert_eq!(
        session.parameters_for(&globbed)?,
        vec![("$param0".to_owned(), Value::String("ob.*".into()))]
    );

    let literal = name.eq("'ob*'")?;
    assert!(!exported(&session, &literal).contains("=~"));

    let err = name.eq("/(unclosed/").unwrap_err();
    assert_eq!(err.code(), "InvalidPattern");
    Ok(())
}

#[test]
fn product_arithmetic_fails_before_touching_the_graph() -> Result<()> {
    let session = common::session();
    let flux = session.root().get("spectra")?.get("flux")?;
    let before = session.vertex_count();
    let err = flux.add(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(err.code(), "ProductArithmetic");
    assert_eq!(session.vertex_count(), before);

    let snr = session.root().get("spectra")?.get("snr")?;
    let before = session.vertex_count();
    assert!(snr.mul(&flux).is_err());
    assert_eq!(session.vertex_count(), before);
    Ok(())
}

#[test]
fn objects_need_an_attribute_for_arithmetic() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    assert_eq!(runs.add(1).unwrap_err().code(), "ObjectArithmetic");
    let by_identity = runs.object_eq(12)?;
    assert_eq!(by_identity.value_kind(), Some(ValueKind::Boolean));
    assert!(session.explain(&by_identity)?.contains("getitem .runid"));
    Ok(())
}

#[test]
fn attribute_filters_keep_the_value_kind() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    let exptime = runs.get("exptime")?;
    let good = runs.get("good")?;
    let kept = exptime.filter(&good)?;
    assert_eq!(kept.value_kind(), Some(ValueKind::Float));
    assert_eq!(kept.index_node(), kept.node());
    let table = kept.precompile()?;
    assert_eq!(table.names(), &["exptime"]);

    let err = exptime.filter(&exptime).unwrap_err();
    assert!(matches!(err, QueryError::NonBooleanMask { .. }));
    Ok(())
}

#[test]
fn unary_operations_and_rounding() -> Result<()> {
    let session = common::session();
    let exptime = session.root().get("runs")?.get("exptime")?;
    let rounded = exptime.neg()?.abs()?.round(2)?;
    assert_eq!(rounded.factor_name(), Some("round2"));
    let text = session.explain(&rounded)?;
    assert!(text.contains("abs"));
    assert!(text.contains("neg"));
    Ok(())
}

#[test]
fn unknown_names_suggest_close_matches() -> Result<()> {
    let session = common::session();
    let runs = session.root().get("runs")?;
    match runs.get("exptme").unwrap_err() {
        QueryError::UnknownName { suggestion, .. } => {
            assert_eq!(suggestion.as_deref(), Some("exptime"))
        }
        other => panic!("unexpected error {other}"),
    }
    Ok(())
}

#[test]
fn options_rename_generated_parameters() -> Result<()> {
    let options = QueryOptions::from_toml_str(
        r#"
        parameter_prefix = "arg"
        relation_label_key = "kind"
        "#,
    )?;
    let session = common::session_with(options);
    let spectra = session.root().get("spectra")?;
    let adjunct = spectra.traverse_to_relative("adjunct", true)?;
    let params = session.parameters_for(&adjunct)?;
    assert_eq!(params, vec![("$arg0".to_owned(), Value::String("adjunct".into()))]);
    assert!(session.explain(&adjunct)?.contains("getitem .kind"));
    Ok(())
}
