//! Tests for filter compilation and query execution

use super::*;
use crate::error::DbError;
use crate::store::{Document, DocumentStore, SledStore};
use serde_json::{json, Map, Value};

fn doc(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn one(name: &str, value: &str) -> Filter {
    Filter::compile(name, value).unwrap()
}

// ============================================================================
// Compilation
// ============================================================================

mod compile_tests {
    use super::*;

    #[test]
    fn suffix_resolution() {
        assert_eq!(one("age", "30").op(), FilterOp::Eq);
        assert_eq!(one("age_gt", "30").op(), FilterOp::Gt);
        assert_eq!(one("age_lt", "30").op(), FilterOp::Lt);
        assert_eq!(one("age_gte", "30").op(), FilterOp::Gte);
        assert_eq!(one("age_lte", "30").op(), FilterOp::Lte);
        assert_eq!(one("status_ne", "open").op(), FilterOp::Ne);
        assert_eq!(one("status_in", "a,b").op(), FilterOp::In);
        assert_eq!(one("email_regex", "@example").op(), FilterOp::Regex);
        assert_eq!(one("email_exists", "true").op(), FilterOp::Exists);
    }

    #[test]
    fn suffix_strips_field_name() {
        assert_eq!(one("age_gte", "30").field(), "age");
        assert_eq!(one("email_exists", "1").field(), "email");
        assert_eq!(one("status", "open").field(), "status");
    }

    #[test]
    fn compound_suffixes_resolve_whole() {
        // _gte must not decompose into _gt plus a dangling character
        let f = one("margin_gte", "1");
        assert_eq!(f.field(), "margin");
        assert_eq!(f.op(), FilterOp::Gte);

        let f = one("price_lte", "1");
        assert_eq!(f.field(), "price");
        assert_eq!(f.op(), FilterOp::Lte);
    }

    #[test]
    fn embedded_suffix_is_an_operator() {
        // "log_in" reads as field "log" with the _in operator
        let f = one("log_in", "a,b");
        assert_eq!(f.field(), "log");
        assert_eq!(f.op(), FilterOp::In);
    }

    #[test]
    fn invalid_field_name_rejected() {
        assert!(matches!(
            Filter::compile("bad-name", "x"),
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            Filter::compile("a'; DROP TABLE records;--", "x"),
            Err(DbError::Validation(_))
        ));
        // bare suffix leaves an empty field
        assert!(matches!(
            Filter::compile("_gt", "1"),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn numeric_operand_must_parse() {
        assert!(matches!(
            Filter::compile("age_gt", "abc"),
            Err(DbError::Validation(_))
        ));
        assert!(Filter::compile("age_gt", " 30 ").is_ok());
        assert!(Filter::compile("age_lte", "-1.5").is_ok());
    }

    #[test]
    fn invalid_regex_rejected() {
        assert!(matches!(
            Filter::compile("email_regex", "(unclosed"),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn reserved_params_are_skipped() {
        let filters =
            compile_filters([("limit", "10"), ("page", "2"), ("name", "Ada")]).unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].field(), "name");
    }

    #[test]
    fn compilation_preserves_parameter_order() {
        let filters =
            compile_filters([("b", "1"), ("a_gt", "2"), ("c_exists", "true")]).unwrap();
        let fields: Vec<&str> = filters.iter().map(|f| f.field()).collect();
        assert_eq!(fields, vec!["b", "a", "c"]);
    }
}

// ============================================================================
// Predicate evaluation
// ============================================================================

mod matches_tests {
    use super::*;

    #[test]
    fn exact_match_compares_text() {
        let data = doc(&[
            ("name", json!("Ada")),
            ("age", json!(36)),
            ("active", json!(true)),
        ]);
        assert!(one("name", "Ada").matches(&data));
        assert!(!one("name", "ada").matches(&data));
        // numbers and booleans compare through their literal form
        assert!(one("age", "36").matches(&data));
        assert!(one("active", "true").matches(&data));
        assert!(!one("missing", "x").matches(&data));
    }

    #[test]
    fn null_and_absent_never_equal() {
        let data = doc(&[("nick", json!(null))]);
        assert!(!one("nick", "Ada").matches(&data));
        assert!(!one("other", "Ada").matches(&data));
    }

    #[test]
    fn not_equal_requires_a_value() {
        let data = doc(&[("status", json!("open")), ("nick", json!(null))]);
        assert!(one("status_ne", "closed").matches(&data));
        assert!(!one("status_ne", "open").matches(&data));
        // absent and null fields do not satisfy _ne
        assert!(!one("missing_ne", "x").matches(&data));
        assert!(!one("nick_ne", "x").matches(&data));
    }

    #[test]
    fn numeric_comparisons() {
        let data = doc(&[("age", json!(36))]);
        assert!(one("age_gt", "30").matches(&data));
        assert!(!one("age_gt", "36").matches(&data));
        assert!(one("age_gte", "36").matches(&data));
        assert!(one("age_lt", "40").matches(&data));
        assert!(one("age_lte", "36").matches(&data));
        assert!(!one("age_lt", "36").matches(&data));
    }

    #[test]
    fn numeric_casts_string_values() {
        let data = doc(&[("price", json!("19.99"))]);
        assert!(one("price_gt", "10").matches(&data));
        assert!(one("price_lte", "19.99").matches(&data));
    }

    #[test]
    fn non_numeric_field_excluded_not_error() {
        let data = doc(&[("age", json!("unknown")), ("tags", json!(["a"]))]);
        assert!(!one("age_gt", "0").matches(&data));
        assert!(!one("tags_gt", "0").matches(&data));
        assert!(!one("missing_gt", "0").matches(&data));
    }

    #[test]
    fn membership_over_tokens() {
        let data = doc(&[("status", json!("pending"))]);
        assert!(one("status_in", "open,pending,closed").matches(&data));
        assert!(!one("status_in", "open,closed").matches(&data));
        // single token still works
        assert!(one("status_in", "pending").matches(&data));
    }

    #[test]
    fn membership_compares_text_form() {
        let data = doc(&[("code", json!(7))]);
        assert!(one("code_in", "5,6,7").matches(&data));
    }

    #[test]
    fn regex_is_case_insensitive() {
        let data = doc(&[("email", json!("Ada@Example.COM"))]);
        assert!(one("email_regex", "@example\\.com$").matches(&data));
        assert!(one("email_regex", "^ada").matches(&data));
        assert!(!one("email_regex", "@other").matches(&data));
    }

    #[test]
    fn exists_checks_key_presence_only() {
        let data = doc(&[("nick", json!(null)), ("name", json!("Ada"))]);
        // a null value still counts as present
        assert!(one("nick_exists", "true").matches(&data));
        assert!(one("nick_exists", "1").matches(&data));
        assert!(!one("nick_exists", "false").matches(&data));
        assert!(one("missing_exists", "false").matches(&data));
        assert!(!one("missing_exists", "true").matches(&data));
        // any non-true operand means "must be absent"
        assert!(one("missing_exists", "whatever").matches(&data));
    }

    #[test]
    fn containers_match_through_compact_json() {
        let data = doc(&[("tags", json!(["a", "b"]))]);
        assert!(one("tags", "[\"a\",\"b\"]").matches(&data));
    }

    #[test]
    fn filters_combine_with_and() {
        let data = doc(&[("age", json!(36)), ("status", json!("open"))]);
        let filters = compile_filters([("age_gt", "30"), ("status", "open")]).unwrap();
        assert!(matches_all(&filters, &data));

        let filters = compile_filters([("age_gt", "40"), ("status", "open")]).unwrap();
        assert!(!matches_all(&filters, &data));

        assert!(matches_all(&[], &data));
    }
}

// ============================================================================
// Executor
// ============================================================================

mod exec_tests {
    use super::*;

    fn store_with_docs(n: usize) -> (tempfile::TempDir, SledStore, crate::store::CollectionId) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();
        let project = store.create_project("demo", "acct").unwrap();
        let coll = store.create_collection(project.id, "items").unwrap();
        for i in 0..n {
            let mut data = Document::new();
            data.insert("seq".to_string(), json!(i));
            data.insert(
                "parity".to_string(),
                json!(if i % 2 == 0 { "even" } else { "odd" }),
            );
            store.insert(coll.id, data).unwrap();
        }
        (dir, store, coll.id)
    }

    #[test]
    fn defaults_and_param_parsing() {
        assert_eq!(parse_page_param(None), 1);
        assert_eq!(parse_limit_param(None), 50);
        assert_eq!(parse_page_param(Some("3")), 3);
        assert_eq!(parse_limit_param(Some(" 20 ")), 20);
        // malformed values fall back to defaults
        assert_eq!(parse_page_param(Some("abc")), 1);
        assert_eq!(parse_limit_param(Some("")), 50);
    }

    #[test]
    fn count_agrees_with_list() {
        let (_dir, store, coll) = store_with_docs(25);
        let filters = compile_filters([("parity", "even")]).unwrap();

        let page = list(&store, coll, &filters, 1, MAX_LIMIT).unwrap();
        assert_eq!(page.pagination.total as usize, page.records.len());
        assert_eq!(page.pagination.total, 13);
    }

    #[test]
    fn pagination_law_no_gaps_no_duplicates() {
        let (_dir, store, coll) = store_with_docs(23);
        let limit = 5;

        let first = list(&store, coll, &[], 1, limit).unwrap();
        assert_eq!(first.pagination.total, 23);
        assert_eq!(first.pagination.pages, 5);

        let mut seen = Vec::new();
        for page_no in 1..=first.pagination.pages {
            let page = list(&store, coll, &[], page_no, limit).unwrap();
            for record in &page.records {
                seen.push(record["seq"].as_i64().unwrap());
            }
        }

        // newest-first across page boundaries, each match exactly once
        let expected: Vec<i64> = (0..23).rev().collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn total_is_independent_of_pagination() {
        let (_dir, store, coll) = store_with_docs(12);
        let filters = compile_filters([("seq_gte", "4")]).unwrap();

        let page = list(&store, coll, &filters, 2, 3).unwrap();
        assert_eq!(page.pagination.total, 8);
        assert_eq!(page.pagination.pages, 3);
        assert_eq!(page.records.len(), 3);

        let seqs: Vec<i64> = page
            .records
            .iter()
            .map(|r| r["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, vec![8, 7, 6]);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let (_dir, store, coll) = store_with_docs(4);
        let page = list(&store, coll, &[], 9, 10).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.pagination.total, 4);
        assert_eq!(page.pagination.pages, 1);
    }

    #[test]
    fn limit_is_clamped() {
        let (_dir, store, coll) = store_with_docs(3);

        let page = list(&store, coll, &[], 1, 100_000).unwrap();
        assert_eq!(page.pagination.limit, MAX_LIMIT);

        let page = list(&store, coll, &[], 0, 0).unwrap();
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.limit, 1);
        assert_eq!(page.records.len(), 1);
    }

    #[test]
    fn merged_records_carry_id_and_created_at() {
        let (_dir, store, coll) = store_with_docs(1);
        let page = list(&store, coll, &[], 1, 10).unwrap();
        let record = &page.records[0];
        assert!(record["id"].is_string());
        assert!(record["created_at"].is_string());
        assert_eq!(record["seq"], json!(0));
    }

    #[test]
    fn exists_filter_partitions_the_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();
        let project = store.create_project("demo", "acct").unwrap();
        let coll = store.create_collection(project.id, "items").unwrap();

        for i in 0..6 {
            let mut data = Document::new();
            data.insert("seq".to_string(), json!(i));
            if i < 2 {
                data.insert("email".to_string(), json!(format!("u{}@x.io", i)));
            }
            store.insert(coll.id, data).unwrap();
        }

        let with = compile_filters([("email_exists", "true")]).unwrap();
        let without = compile_filters([("email_exists", "false")]).unwrap();
        let n_with = store.count(coll.id, &with).unwrap();
        let n_without = store.count(coll.id, &without).unwrap();
        assert_eq!(n_with, 2);
        assert_eq!(n_without, 4);
        assert_eq!(n_with + n_without, 6);
    }
}
