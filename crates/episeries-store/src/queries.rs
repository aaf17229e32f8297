//! SQL compilation of [`Filter`] predicates and [`RowShape`] projections.
//!
//! Column-backed fields compile to their column; every other field is
//! looked up in the record's `attributes` JSON object. Field names are
//! interpolated into SQL, so they are restricted to ASCII alphanumerics and
//! underscores. Values are always bound as parameters.

use episeries_types::{Aggregation, Constraint, Filter, RowShape, Scalar, SortOrder};

use crate::error::{Error, Result};

/// Fields stored as real columns on the `records` table.
const COLUMN_FIELDS: &[&str] = &[
    "date",
    "location",
    "period_type",
    "source_id",
    "is_date_total",
];

pub(crate) type Params = Vec<Box<dyn rusqlite::ToSql>>;

/// Check that a field name is safe to interpolate.
pub(crate) fn validate_field(field: &str) -> Result<()> {
    if !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::InvalidField(field.to_string()))
    }
}

/// SQL expression reading a field.
pub(crate) fn field_expr(field: &str) -> Result<String> {
    validate_field(field)?;
    if COLUMN_FIELDS.contains(&field) {
        Ok(field.to_string())
    } else {
        Ok(format!("json_extract(attributes, '$.{}')", field))
    }
}

fn scalar_param(value: &Scalar) -> Box<dyn rusqlite::ToSql> {
    match value {
        Scalar::Bool(b) => Box::new(i64::from(*b)),
        Scalar::Number(n) => Box::new(*n),
        Scalar::Text(s) => Box::new(s.clone()),
    }
}

/// Build the WHERE clause and parameters for a collection and filter.
pub(crate) fn build_where(collection: &str, filter: &Filter) -> Result<(String, Params)> {
    let mut conditions = vec!["collection = ?".to_string()];
    let mut params: Params = vec![Box::new(collection.to_string())];

    for (field, constraint) in &filter.predicates {
        let expr = field_expr(field)?;
        match constraint {
            Constraint::Eq(value) => {
                conditions.push(format!("{} = ?", expr));
                params.push(scalar_param(value));
            }
            Constraint::In(values) if values.is_empty() => {
                // Membership in the empty set never holds
                conditions.push("0".to_string());
            }
            Constraint::In(values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                conditions.push(format!("{} IN ({})", expr, placeholders));
                params.extend(values.iter().map(scalar_param));
            }
            Constraint::Exists => conditions.push(format!("{} IS NOT NULL", expr)),
            Constraint::NotExists => conditions.push(format!("{} IS NULL", expr)),
        }
    }

    if let Some(from) = filter.date_from {
        conditions.push("date >= ?".to_string());
        params.push(Box::new(from.unix_timestamp()));
    }

    if let Some(to) = filter.date_to {
        conditions.push("date <= ?".to_string());
        params.push(Box::new(to.unix_timestamp()));
    }

    Ok((format!("WHERE {}", conditions.join(" AND ")), params))
}

fn value_expr(shape: &RowShape) -> Result<String> {
    Ok(format!("CAST({} AS REAL)", field_expr(&shape.value_field)?))
}

fn split_expr(shape: &RowShape) -> Result<String> {
    match &shape.split_field {
        Some(field) => Ok(format!("CAST({} AS TEXT)", field_expr(field)?)),
        None => Ok("NULL".to_string()),
    }
}

/// Grouped retrieval: one row per date, or per date and split value.
///
/// The indicator's aggregation combines records of the same location;
/// locations are then summed. Selected columns: `date, total, split_value`.
pub(crate) fn build_aggregate_sql(where_clause: &str, shape: &RowShape) -> Result<String> {
    let func = match shape.aggregation {
        Aggregation::Sum => "SUM",
        Aggregation::Max => "MAX",
    };

    Ok(format!(
        "SELECT date, SUM(total) AS total, split_value FROM (\
             SELECT date, location, {func}({value}) AS total, {split} AS split_value \
             FROM records {where_clause} \
             GROUP BY date, location, split_value\
         ) GROUP BY date, split_value ORDER BY date ASC, split_value ASC",
        value = value_expr(shape)?,
        split = split_expr(shape)?,
    ))
}

/// Raw retrieval: one row per stored record.
///
/// Selected columns: `date, total, split_value, location`.
pub(crate) fn build_raw_sql(
    where_clause: &str,
    shape: &RowShape,
    order: SortOrder,
    limit: Option<u32>,
) -> Result<String> {
    let direction = match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };

    let mut sql = format!(
        "SELECT date, {value} AS total, {split} AS split_value, location \
         FROM records {where_clause} ORDER BY date {direction}, id {direction}",
        value = value_expr(shape)?,
        split = split_expr(shape)?,
    );

    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    Ok(sql)
}

/// Distinct data-source identifiers.
pub(crate) fn build_sources_sql(where_clause: &str) -> String {
    format!(
        "SELECT DISTINCT source_id FROM records {where_clause} \
         AND source_id IS NOT NULL ORDER BY source_id ASC"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_field_expr_columns_and_attributes() {
        assert_eq!(field_expr("location").unwrap(), "location");
        assert_eq!(field_expr("is_date_total").unwrap(), "is_date_total");
        assert_eq!(
            field_expr("age_group").unwrap(),
            "json_extract(attributes, '$.age_group')"
        );
    }

    #[test]
    fn test_field_expr_rejects_injection() {
        assert!(matches!(
            field_expr("x') OR 1=1 --"),
            Err(Error::InvalidField(_))
        ));
        assert!(matches!(field_expr(""), Err(Error::InvalidField(_))));
        assert!(matches!(field_expr("a.b"), Err(Error::InvalidField(_))));
    }

    #[test]
    fn test_build_where_collection_only() {
        let (where_clause, params) = build_where("cases", &Filter::new()).unwrap();
        assert_eq!(where_clause, "WHERE collection = ?");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_build_where_all_constraint_kinds() {
        let filter = Filter::new()
            .eq("location", "DE")
            .with(
                "gender",
                Constraint::In(vec![Scalar::from("male"), Scalar::from("female")]),
            )
            .with("age_group", Constraint::Exists)
            .with("variant_id", Constraint::NotExists)
            .since(datetime!(2024-01-01 00:00:00 UTC))
            .until(datetime!(2024-01-31 23:59:59.999 UTC));

        let (where_clause, params) = build_where("cases", &filter).unwrap();

        assert!(where_clause.contains("location = ?"));
        assert!(where_clause.contains("json_extract(attributes, '$.gender') IN (?, ?)"));
        assert!(where_clause.contains("json_extract(attributes, '$.age_group') IS NOT NULL"));
        assert!(where_clause.contains("json_extract(attributes, '$.variant_id') IS NULL"));
        assert!(where_clause.contains("date >= ?"));
        assert!(where_clause.contains("date <= ?"));
        // collection + location + 2 genders + 2 dates
        assert_eq!(params.len(), 6);
    }

    #[test]
    fn test_build_where_empty_membership_matches_nothing() {
        let filter = Filter::new().with("location", Constraint::In(Vec::new()));
        let (where_clause, params) = build_where("cases", &filter).unwrap();
        assert!(where_clause.ends_with("AND 0"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_aggregate_sql_without_split() {
        let shape = RowShape::new("value", Aggregation::Sum);
        let sql = build_aggregate_sql("WHERE collection = ?", &shape).unwrap();
        assert!(sql.contains("SUM(CAST(json_extract(attributes, '$.value') AS REAL))"));
        assert!(sql.contains("NULL AS split_value"));
        assert!(sql.contains("GROUP BY date, location, split_value"));
        assert!(sql.ends_with("GROUP BY date, split_value ORDER BY date ASC, split_value ASC"));
    }

    #[test]
    fn test_aggregate_sql_max_per_location_then_sum() {
        let shape = RowShape::new("occupied", Aggregation::Max).split_by(Some("bed_type"));
        let sql = build_aggregate_sql("WHERE collection = ?", &shape).unwrap();
        assert!(sql.starts_with("SELECT date, SUM(total) AS total, split_value FROM ("));
        assert!(sql.contains("MAX(CAST(json_extract(attributes, '$.occupied') AS REAL))"));
        assert!(sql.contains("CAST(json_extract(attributes, '$.bed_type') AS TEXT) AS split_value"));
        assert!(sql.contains("GROUP BY date, location, split_value"));
    }

    #[test]
    fn test_raw_sql_order_and_limit() {
        let shape = RowShape::new("value", Aggregation::Sum);
        let sql =
            build_raw_sql("WHERE collection = ?", &shape, SortOrder::Descending, Some(1)).unwrap();
        assert!(sql.contains("ORDER BY date DESC, id DESC"));
        assert!(sql.ends_with("LIMIT 1"));
        assert!(sql.contains("NULL AS split_value"));
    }

    #[test]
    fn test_sources_sql() {
        let sql = build_sources_sql("WHERE collection = ?");
        assert!(sql.contains("SELECT DISTINCT source_id"));
        assert!(sql.contains("source_id IS NOT NULL"));
    }
}
