//! Builtin catalog for the `books` collection.
//!
//! Records look like
//! `{ title, author, genre, published_year: int, price: number, in_stock: bool }`.

use bson::doc;

use super::Catalog;
use crate::errors::DbError;
use crate::spec::{IndexKeys, ParamType, QuerySpec, SortSpec};

/// Page size of the `paginate` query; override per call with `Params::with_limit`.
pub const PAGE_SIZE: u64 = 5;

fn specs() -> Vec<QuerySpec> {
    vec![
        // CRUD
        QuerySpec::find("by_genre", doc! {"genre": "$genre"})
            .with_param("genre", ParamType::String)
            .with_description("Books in a genre"),
        QuerySpec::find("published_after", doc! {"published_year": {"$gt": "$year"}})
            .with_param("year", ParamType::Int)
            .with_description("Books published strictly after a year"),
        QuerySpec::find("by_author", doc! {"author": "$author"})
            .with_param("author", ParamType::String)
            .with_description("Books by an author"),
        QuerySpec::update_one("set_price_by_title", doc! {"title": "$title"}, doc! {"$set": {"price": "$price"}})
            .with_param("title", ParamType::String)
            .with_param("price", ParamType::Number)
            .with_description("Set the price of the first book with a title"),
        QuerySpec::delete_one("delete_by_title", doc! {"title": "$title"})
            .with_param("title", ParamType::String)
            .with_description("Delete the first book with a title"),
        // Filters, projection, sort, pagination
        QuerySpec::find("in_stock_published_after", doc! {"in_stock": true, "published_year": {"$gt": "$year"}})
            .with_param("year", ParamType::Int)
            .with_description("In-stock books published after a year"),
        QuerySpec::find("title_author_price", doc! {})
            .with_projection(doc! {"_id": 0, "title": 1, "author": 1, "price": 1})
            .with_description("Title, author and price of every book"),
        QuerySpec::find("by_price_asc", doc! {}).with_sort(vec![SortSpec::asc("price")]),
        QuerySpec::find("by_price_desc", doc! {}).with_sort(vec![SortSpec::desc("price")]),
        QuerySpec::find("paginate", doc! {})
            .with_skip(0)
            .with_limit(PAGE_SIZE)
            .with_description("One page of books in natural order; pass skip for later pages"),
        // Aggregation
        QuerySpec::aggregate(
            "avg_price_by_genre",
            vec![doc! {"$group": {"_id": "$genre", "average_price": {"$avg": "$price"}}}],
        ),
        QuerySpec::aggregate(
            "top_author",
            vec![
                doc! {"$group": {"_id": "$author", "count": {"$sum": 1}}},
                doc! {"$sort": {"count": -1}},
                doc! {"$limit": 1},
            ],
        )
        .with_description("Author with the most books"),
        QuerySpec::aggregate(
            "count_by_decade",
            vec![
                doc! {"$project": {"decade": {"$concat": [{"$substr": [{"$toString": "$published_year"}, 0, 3]}, "0s"]}}},
                doc! {"$group": {"_id": "$decade", "count": {"$sum": 1}}},
            ],
        )
        .with_field_type("published_year", ParamType::Int)
        .with_description("Book count per publication decade, e.g. \"2010s\""),
        // Indexes
        QuerySpec::create_index("index_title", IndexKeys::new(vec![SortSpec::asc("title")])),
        QuerySpec::create_index(
            "index_author_year",
            IndexKeys::new(vec![SortSpec::asc("author"), SortSpec::asc("published_year")]),
        ),
        QuerySpec::find("by_title", doc! {"title": "$title"})
            .with_param("title", ParamType::String)
            .with_description("Exact title lookup, served by index_title once it exists"),
    ]
}

/// Every builtin book query, validated and registered.
///
/// # Errors
/// Only if a builtin spec fails validation.
pub fn builtin() -> Result<Catalog, DbError> {
    let mut catalog = Catalog::new();
    for spec in specs() {
        catalog.register(spec)?;
    }
    Ok(catalog)
}
