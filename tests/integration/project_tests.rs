//! Integration tests for whole-project conversion

use pretty_assertions::assert_eq;

use rust_queryconv::convert::{ConversionFailureReason, ParameterMapping};
use rust_queryconv::project::{QueryReport, ReportSummary};
use rust_queryconv::{convert_project, ConvertOptions, DatabaseDialect};

use crate::common::{ProjectContext, SHOP_PROJECT};

fn options(ctx: &ProjectContext) -> ConvertOptions {
    ConvertOptions {
        project_path: ctx.project_path(),
        dialect: None,
        output_path: None,
    }
}

fn report<'a>(reports: &'a [QueryReport], name: &str) -> &'a QueryReport {
    reports
        .iter()
        .find(|report| report.name == name)
        .unwrap_or_else(|| panic!("no report named {}", name))
}

#[test]
fn test_convert_shop_project() {
    let ctx = ProjectContext::with_project(SHOP_PROJECT);
    let reports = convert_project(&options(&ctx)).expect("project converts");

    assert_eq!(reports.len(), 6);
    assert_eq!(
        ReportSummary::of(&reports),
        ReportSummary {
            converted: 4,
            failed: 2
        }
    );
    // report order follows the project file
    let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "byName",
            "openOrders",
            "findByEmailAddress",
            "countByActiveTrue",
            "broken",
            "unparsable"
        ]
    );
    assert!(reports
        .iter()
        .all(|r| r.dialect == DatabaseDialect::Postgresql));
}

#[test]
fn test_declared_types_flow_into_parameters() {
    let ctx = ProjectContext::with_project(SHOP_PROJECT);
    let reports = convert_project(&options(&ctx)).unwrap();

    let by_name = &report(&reports, "byName").result;
    assert_eq!(
        by_name.native_sql(),
        Some("SELECT * FROM customers c WHERE c.name = ?")
    );
    assert_eq!(
        by_name.parameter_mappings(),
        &[ParameterMapping::new(
            "name",
            1,
            Some("String".to_string()),
            Some("name".to_string())
        )]
    );
}

#[test]
fn test_join_query_in_project() {
    let ctx = ProjectContext::with_project(SHOP_PROJECT);
    let reports = convert_project(&options(&ctx)).unwrap();

    let open_orders = &report(&reports, "openOrders").result;
    assert_eq!(
        open_orders.native_sql(),
        Some("SELECT * FROM orders o INNER JOIN customers c ON o.customer_id = c.id WHERE c.active = true AND o.status = ?")
    );
}

#[test]
fn test_derived_method_uses_column_override() {
    let ctx = ProjectContext::with_project(SHOP_PROJECT);
    let reports = convert_project(&options(&ctx)).unwrap();

    let by_email = &report(&reports, "findByEmailAddress").result;
    assert_eq!(
        by_email.native_sql(),
        Some("SELECT * FROM customers WHERE email = ? ")
    );
    assert_eq!(
        by_email.parameter_mappings(),
        &[ParameterMapping::new(
            "email",
            1,
            None,
            Some("email".to_string())
        )]
    );
}

#[test]
fn test_failures_are_reported_not_raised() {
    let ctx = ProjectContext::with_project(SHOP_PROJECT);
    let reports = convert_project(&options(&ctx)).unwrap();

    assert_eq!(
        report(&reports, "broken").result.failure_reason(),
        Some(ConversionFailureReason::MissingEntityMetadata)
    );
    assert_eq!(
        report(&reports, "unparsable").result.failure_reason(),
        Some(ConversionFailureReason::ParserError)
    );
}

#[test]
fn test_dialect_override() {
    let ctx = ProjectContext::with_project(SHOP_PROJECT);
    let mut opts = options(&ctx);
    opts.dialect = Some(DatabaseDialect::Oracle);
    let reports = convert_project(&opts).unwrap();

    assert_eq!(
        report(&reports, "countByActiveTrue").result.native_sql(),
        Some("SELECT COUNT(*) FROM customers WHERE active  = 1 ")
    );
    assert_eq!(
        report(&reports, "openOrders").result.native_sql(),
        Some("SELECT * FROM orders o INNER JOIN customers c ON o.customer_id = c.id WHERE c.active = 1 AND o.status = ?")
    );
}

#[test]
fn test_report_is_written() {
    let ctx = ProjectContext::with_project(SHOP_PROJECT);
    let mut opts = options(&ctx);
    opts.output_path = Some(ctx.report_path());
    convert_project(&opts).unwrap();

    let written = std::fs::read_to_string(ctx.report_path()).expect("report exists");
    let json: serde_json::Value = serde_json::from_str(&written).unwrap();
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 6);
    assert_eq!(entries[0]["name"], "byName");
    assert_eq!(entries[0]["result"]["status"], "success");
    assert_eq!(
        entries[0]["result"]["parameterMappings"][0]["declaredType"],
        "String"
    );
}

#[test]
fn test_missing_project_file() {
    let ctx = ProjectContext::with_project(SHOP_PROJECT);
    let mut opts = options(&ctx);
    opts.project_path = ctx.project_dir.join("missing.json");
    let err = convert_project(&opts).unwrap_err();
    assert!(err.to_string().contains("Failed to read project file"));
}

#[test]
fn test_project_without_dialect() {
    let ctx = ProjectContext::with_project(r#"{ "entities": [], "queries": [] }"#);
    let err = convert_project(&options(&ctx)).unwrap_err();
    assert!(err.to_string().contains("neither 'dialect' nor 'jdbcUrl'"));
}
