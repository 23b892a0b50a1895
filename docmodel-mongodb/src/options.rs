//! Conversion of query options into driver options.

use mongodb::options::{FindOneOptions, FindOptions, Hint};

use docmodel_core::query::QueryOptions;

/// Builds driver find options from the options of a query.
pub(crate) fn find_options(options: &QueryOptions) -> FindOptions {
    let mut find = FindOptions::default();

    find.projection = options.fields.clone();
    find.sort = options.sort_document();
    find.limit = options.limit;
    find.skip = options.skip;
    find.hint = options.hint.clone().map(Hint::Keys);
    find.batch_size = options.batch_size;

    find
}

/// Builds driver find-one options. Limit and batch size do not apply.
pub(crate) fn find_one_options(options: &QueryOptions) -> FindOneOptions {
    let mut find = FindOneOptions::default();

    find.projection = options.fields.clone();
    find.sort = options.sort_document();
    find.skip = options.skip;
    find.hint = options.hint.clone().map(Hint::Keys);

    find
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn carries_every_query_option() {
        let options = QueryOptions {
            fields: Some(doc! { "title": 1 }),
            sort: vec![("date".to_string(), -1), ("title".to_string(), 1)],
            limit: Some(10),
            skip: Some(20),
            hint: Some(doc! { "date": -1 }),
            batch_size: Some(5),
        };

        let find = find_options(&options);

        assert_eq!(find.projection, Some(doc! { "title": 1 }));
        assert_eq!(find.sort, Some(doc! { "date": -1, "title": 1 }));
        assert_eq!(find.limit, Some(10));
        assert_eq!(find.skip, Some(20));
        assert_eq!(find.batch_size, Some(5));
        assert!(matches!(find.hint, Some(Hint::Keys(ref keys)) if keys == &doc! { "date": -1 }));
    }

    #[test]
    fn unsorted_queries_send_no_sort() {
        let find = find_one_options(&QueryOptions::default());

        assert!(find.sort.is_none());
        assert!(find.projection.is_none());
    }
}
