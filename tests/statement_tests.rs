//! SQL 语句抽取的集成测试

use pglog_analysis::statement::{ExtractError, KVPair, extract, statement_from_message};

fn pairs(sql: &str) -> Vec<KVPair> {
    extract(sql).unwrap().into_vec()
}

#[test]
fn test_logged_statement_round_trip() {
    let message = "statement: SELECT id FROM customers WHERE email = 'a@b.io' AND status = 'active'";
    let sql = statement_from_message(message).unwrap();
    assert_eq!(
        pairs(sql),
        vec![KVPair::new("email", "a@b.io"), KVPair::new("status", "active")]
    );
}

#[test]
fn test_multiple_statements() {
    assert_eq!(
        pairs("SELECT * FROM a WHERE x = 1; DELETE FROM b WHERE y = 'z'"),
        vec![KVPair::new("x", "1"), KVPair::new("y", "z")]
    );
}

#[test]
fn test_in_list_and_like() {
    assert_eq!(
        pairs("SELECT * FROM t WHERE country IN ('FR', 'DE') AND name LIKE 'Jo%'"),
        vec![
            KVPair::new("country", "FR"),
            KVPair::new("country", "DE"),
            KVPair::new("name", "Jo%"),
        ]
    );
}

#[test]
fn test_insert_columns_align_with_values() {
    assert_eq!(
        pairs("INSERT INTO users (email, phone) VALUES ('x@y.z', '555-0101')"),
        vec![KVPair::new("email", "x@y.z"), KVPair::new("phone", "555-0101")]
    );
}

#[test]
fn test_structural_errors() {
    assert!(matches!(
        extract("INSERT INTO t (a) VALUES (1, 2)"),
        Err(ExtractError::RowLength { expected: 1, found: 2 })
    ));
    assert!(matches!(extract("SELEC * FRM t"), Err(ExtractError::Sql(_))));
}

#[test]
fn test_only_dml_messages_are_statements() {
    assert!(statement_from_message("statement: CREATE TABLE t (a int)").is_none());
    assert!(statement_from_message("statement: ALTER ROLE bob PASSWORD 'x'").is_none());
    assert_eq!(
        statement_from_message("statement: DELETE FROM t"),
        Some("DELETE FROM t")
    );
}
