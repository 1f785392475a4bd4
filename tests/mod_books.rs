mod common;

use bson::doc;
use common::{books_runner, titles};
use shelfquery::{DbError, ExplainPlan, IndexKeys, Params, QueryResult, SortSpec};

#[test]
fn crud_lookups() {
    let r = books_runner();
    let docs = r.run("by_genre", &Params::new().with("genre", "Business")).unwrap().into_documents().unwrap();
    assert_eq!(titles(&docs), ["Zero to One", "Good to Great"]);

    let docs = r.run("by_author", &Params::new().with("author", "Cal Newport")).unwrap().into_documents().unwrap();
    assert_eq!(titles(&docs), ["Deep Work", "So Good They Can't Ignore You", "Digital Minimalism"]);

    let docs = r.run("published_after", &Params::new().with("year", 2015)).unwrap().into_documents().unwrap();
    assert_eq!(titles(&docs), ["Deep Work", "Atomic Habits", "Digital Minimalism"]);

    let docs = r.run("in_stock_published_after", &Params::new().with("year", 2010)).unwrap().into_documents().unwrap();
    assert_eq!(docs.len(), 6);
    assert!(docs.iter().all(|d| d.get_bool("in_stock").unwrap() && d.get_i32("published_year").unwrap() > 2010));
}

#[test]
fn update_and_delete_report_counts() {
    let r = books_runner();
    let params = Params::new().with("title", "Deep Work").with("price", 20.0);
    let res = r.run("set_price_by_title", &params).unwrap();
    let rep = res.updated().unwrap();
    assert_eq!((rep.matched, rep.modified), (1, 1));
    let again = r.run("set_price_by_title", &params).unwrap().updated().unwrap();
    assert_eq!((again.matched, again.modified), (1, 0));

    let found = r.run("by_title", &Params::new().with("title", "Deep Work")).unwrap();
    assert_eq!(found.documents().unwrap()[0].get_f64("price").unwrap(), 20.0);

    let del = Params::new().with("title", "Zero to One");
    assert_eq!(r.run("delete_by_title", &del).unwrap().deleted().unwrap().deleted, 1);
    // A second delete matches nothing, which is still a success.
    assert_eq!(r.run("delete_by_title", &del).unwrap().deleted().unwrap().deleted, 0);
    assert_eq!(r.store().len("books"), 9);

    let missing = r.run("set_price_by_title", &Params::new().with("title", "Nope").with("price", 1)).unwrap();
    assert_eq!(missing.updated().unwrap().matched, 0);
}

#[test]
fn projection_sort_and_pagination() {
    let r = books_runner();
    let docs = r.run("title_author_price", &Params::new()).unwrap().into_documents().unwrap();
    assert_eq!(docs.len(), 10);
    for d in &docs {
        assert_eq!(d.keys().collect::<Vec<_>>(), ["title", "author", "price"]);
    }

    let asc = r.run("by_price_asc", &Params::new()).unwrap().into_documents().unwrap();
    assert_eq!(titles(&asc)[..3], ["So Good They Can't Ignore You", "Atomic Habits", "Digital Minimalism"]);
    let desc = r.run("by_price_desc", &Params::new()).unwrap().into_documents().unwrap();
    assert_eq!(titles(&desc)[0], "The Pragmatic Programmer");
    assert_eq!(titles(&desc)[9], "So Good They Can't Ignore You");

    let page1 = r.run("paginate", &Params::new()).unwrap().into_documents().unwrap();
    assert_eq!(page1.len(), 5);
    assert_eq!(titles(&page1)[0], "Zero to One");
    let page2 = r.run("paginate", &Params::new().with_skip(5)).unwrap().into_documents().unwrap();
    assert_eq!(
        titles(&page2),
        ["Digital Minimalism", "The Lean Startup", "Thinking, Fast and Slow", "The Pragmatic Programmer", "Sapiens"]
    );
    let page3 = r.run("paginate", &Params::new().with_skip(10)).unwrap().into_documents().unwrap();
    assert!(page3.is_empty());
}

#[test]
fn limit_zero_returns_nothing() {
    let r = books_runner();
    let res = r.run("paginate", &Params::new().with_limit(0)).unwrap();
    assert_eq!(res, QueryResult::Documents(Vec::new()));
}

#[test]
fn aggregations() {
    let r = books_runner();
    let avg = r.run("avg_price_by_genre", &Params::new()).unwrap().into_documents().unwrap();
    let business = avg.iter().find(|d| d.get_str("_id").unwrap() == "Business").unwrap();
    assert_eq!(business.get_f64("average_price").unwrap(), 25.0);
    assert_eq!(avg.len(), 8);

    let top = r.run("top_author", &Params::new()).unwrap().into_documents().unwrap();
    assert_eq!(top, vec![doc! {"_id": "Cal Newport", "count": 3}]);

    let decades = r.run("count_by_decade", &Params::new()).unwrap().into_documents().unwrap();
    assert_eq!(
        decades,
        vec![
            doc! {"_id": "2010s", "count": 8},
            doc! {"_id": "2000s", "count": 1},
            doc! {"_id": "1990s", "count": 1},
        ]
    );
}

#[test]
fn indexes_are_idempotent_and_used_by_explain() {
    let r = books_runner();
    let before = r.explain(&r.bind("by_title", &Params::new().with("title", "Deep Work")).unwrap()).unwrap();
    assert_eq!(before.plan, ExplainPlan::CollectionScan);
    assert_eq!((before.docs_examined, before.returned), (10, 1));

    let first = r.run("index_title", &Params::new()).unwrap();
    let second = r.run("index_title", &Params::new()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.index().unwrap().name, "title_1");

    let ack = r.run("index_author_year", &Params::new()).unwrap();
    assert_eq!(ack.index().unwrap().name, "author_1_published_year_1");

    let after = r.explain(&r.bind("by_title", &Params::new().with("title", "Deep Work")).unwrap()).unwrap();
    assert_eq!(after.plan, ExplainPlan::IndexScan { index: "title_1".into() });
    assert_eq!((after.docs_examined, after.returned), (1, 1));

    let by_author = r.bind("by_author", &Params::new().with("author", "Cal Newport")).unwrap();
    let plan = r.explain(&by_author).unwrap();
    assert_eq!(plan.plan, ExplainPlan::IndexScan { index: "author_1_published_year_1".into() });
    assert_eq!(plan.returned, 3);
}

#[test]
fn index_name_reuse_with_other_keys_conflicts() {
    let mut catalog = shelfquery::catalog::books::builtin().unwrap();
    catalog
        .register(
            shelfquery::QuerySpec::create_index("title_desc", IndexKeys::new(vec![SortSpec::desc("title")]))
                .with_index_name("title_1"),
        )
        .unwrap();
    let r = shelfquery::QueryRunner::new(common::seeded_store(), catalog.into_shared());
    r.run("index_title", &Params::new()).unwrap();
    match r.run("title_desc", &Params::new()).unwrap_err() {
        DbError::IndexConflict { name, existing, requested } => {
            assert_eq!(name, "title_1");
            assert_eq!(existing, IndexKeys::new(vec![SortSpec::asc("title")]));
            assert_eq!(requested, IndexKeys::new(vec![SortSpec::desc("title")]));
        }
        other => panic!("expected IndexConflict, got {other:?}"),
    }
}
