//! Dialect lookup and SQL transform tests

use rust_queryconv::DatabaseDialect;

#[test]
fn test_lookup_is_total() {
    for input in ["", " ", "mysql", "jdbc:mysql://db/app", "ORACLE ", "Pg"] {
        // never panics, unknown input is simply no match
        let _ = DatabaseDialect::from_name(input);
        let _ = DatabaseDialect::from_jdbc_url(input);
    }
    assert_eq!(DatabaseDialect::from_name("mysql"), None);
    assert_eq!(DatabaseDialect::from_jdbc_url(""), None);
    assert_eq!(DatabaseDialect::from_name("Pg"), Some(DatabaseDialect::Postgresql));
    assert_eq!(DatabaseDialect::from_name("ORACLE "), Some(DatabaseDialect::Oracle));
}

#[test]
fn test_from_str_accepts_names_and_urls() {
    assert_eq!(
        "postgres".parse::<DatabaseDialect>().unwrap(),
        DatabaseDialect::Postgresql
    );
    assert_eq!(
        "jdbc:oracle:thin:@db:1521/xe".parse::<DatabaseDialect>().unwrap(),
        DatabaseDialect::Oracle
    );
    assert!("sqlite".parse::<DatabaseDialect>().is_err());
}

#[test]
fn test_limit_only_adds_dialect_suffix() {
    let sql = "SELECT * FROM users WHERE name = ?";
    for limit in [1, 25] {
        let pg = DatabaseDialect::Postgresql.apply_limit_clause(sql, limit);
        assert_eq!(pg, format!("{} LIMIT {}", sql, limit));

        let oracle = DatabaseDialect::Oracle.apply_limit_clause(sql, limit);
        assert_eq!(oracle, format!("{} AND ROWNUM <= {}", sql, limit));
    }
}

#[test]
fn test_limit_keeps_trailing_whitespace() {
    let sql = "SELECT * FROM users WHERE name = ? ";
    assert_eq!(
        DatabaseDialect::Postgresql.apply_limit_clause(sql, 1),
        format!("{}LIMIT 1", sql)
    );
    assert_eq!(
        DatabaseDialect::Oracle.apply_limit_clause(sql, 1),
        format!("{}AND ROWNUM <= 1", sql)
    );
}

#[test]
fn test_boolean_value_is_idempotent_for_other_literals() {
    for dialect in DatabaseDialect::ALL {
        for literal in ["1", "0", "'yes'", "NULL"] {
            let once = dialect.transform_boolean_value(literal);
            assert_eq!(once, literal);
            assert_eq!(dialect.transform_boolean_value(&once), once);
        }
    }
}

#[test]
fn test_transform_sql_leaves_string_literals_alone() {
    let sql = "SELECT * FROM t WHERE flag = true AND note = 'x = true'";
    assert_eq!(
        DatabaseDialect::Oracle.transform_sql(sql),
        "SELECT * FROM t WHERE flag = 1 AND note = 'x = true'"
    );
    assert_eq!(DatabaseDialect::Postgresql.transform_sql(sql), sql);
}

#[test]
fn test_sequence_and_concatenation() {
    assert_eq!(
        DatabaseDialect::Oracle.sequence_next_value_syntax("user_seq"),
        "user_seq.NEXTVAL"
    );
    assert_eq!(
        DatabaseDialect::Postgresql.sequence_next_value_syntax("user_seq"),
        "nextval('user_seq')"
    );
    assert_eq!(DatabaseDialect::Oracle.concatenation_operator(), "||");
}
