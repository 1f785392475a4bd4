use bson::{Bson, doc};
use proptest::prelude::*;
use shelfquery::{BoundOperation, DbError, ParamType, Params, QuerySpec, bind};
use std::sync::Arc;

fn published_after() -> Arc<QuerySpec> {
    Arc::new(QuerySpec::find("published_after", doc! {"published_year": {"$gt": "$year"}}).with_param("year", ParamType::Int))
}

proptest! {
    #[test]
    fn prop_integer_years_substitute_verbatim(year in any::<i64>()) {
        let bound = bind(published_after(), &Params::new().with("year", year)).unwrap();
        match bound.operation() {
            BoundOperation::Find { filter, .. } => {
                prop_assert_eq!(filter, &doc! {"published_year": {"$gt": Bson::Int64(year)}});
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    #[test]
    fn prop_strings_under_range_never_bind(year in "[0-9]{1,6}") {
        let err = bind(published_after(), &Params::new().with("year", year)).unwrap_err();
        let is_mismatch = matches!(err, DbError::TypeMismatch { .. });
        prop_assert!(is_mismatch);
    }

    #[test]
    fn prop_negative_pagination_is_rejected(skip in i64::MIN..0) {
        let spec = Arc::new(QuerySpec::find("all", doc! {}));
        let err = bind(spec, &Params::new().with_skip(skip)).unwrap_err();
        let is_pagination = matches!(err, DbError::InvalidPagination(_));
        prop_assert!(is_pagination);
    }
}
