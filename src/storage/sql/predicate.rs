//! Rendering cohort predicates to sea-query conditions.

use chrono::{DateTime, Utc};
use sea_query::{Alias, Condition, Expr, Func, LikeExpr, SimpleExpr};

use super::SqlDatabase;
use crate::retention::{value_text, Leaf, Predicate, PropertyFilter, PropertyOperator};
use crate::storage::helpers::{escape_like, format_timestamp, LIKE_ESCAPE};
use crate::storage::schema::Events;

/// Render a predicate over the `events` table.
///
/// `buckets` are the bucket boundaries used by [`Leaf::InBucket`].
pub fn render<DB: SqlDatabase>(predicate: &Predicate, buckets: &[DateTime<Utc>]) -> Condition {
    match predicate {
        Predicate::All(parts) if parts.is_empty() => Condition::all().add(Expr::cust("1 = 1")),
        Predicate::Any(parts) if parts.is_empty() => Condition::all().add(Expr::cust("1 = 0")),
        Predicate::All(parts) => parts
            .iter()
            .fold(Condition::all(), |cond, p| cond.add(render::<DB>(p, buckets))),
        Predicate::Any(parts) => parts
            .iter()
            .fold(Condition::any(), |cond, p| cond.add(render::<DB>(p, buckets))),
        Predicate::Leaf(leaf) => Condition::all().add(render_leaf::<DB>(leaf, buckets)),
    }
}

fn render_leaf<DB: SqlDatabase>(leaf: &Leaf, buckets: &[DateTime<Utc>]) -> SimpleExpr {
    match leaf {
        Leaf::EventIs { event, .. } => Expr::col(Events::Event).eq(event.as_str()),
        Leaf::Property { filter, .. } => property::<DB>(filter),
        Leaf::InBucket { index } => match (buckets.get(*index), buckets.get(index + 1)) {
            (Some(start), Some(end)) => Expr::col(Events::Timestamp)
                .gte(format_timestamp(*start))
                .and(Expr::col(Events::Timestamp).lt(format_timestamp(*end))),
            _ => Expr::cust("1 = 0"),
        },
    }
}

/// One property filter. Matches [`PropertyFilter::matches`] row for row.
pub fn property<DB: SqlDatabase>(filter: &PropertyFilter) -> SimpleExpr {
    let value = DB::json_text(Expr::col(Events::Properties).into(), &filter.key);
    match filter.operator {
        PropertyOperator::Exact => Expr::expr(value).is_in(filter.values()),
        PropertyOperator::IsNot => {
            Expr::expr(Func::coalesce([value, Expr::val("").into()])).is_not_in(filter.values())
        }
        PropertyOperator::Icontains => {
            let needle = value_text(&filter.value).unwrap_or_default().to_lowercase();
            let pattern = format!("%{}%", escape_like(&needle));
            Expr::expr(Func::lower(value)).like(LikeExpr::new(pattern).escape(LIKE_ESCAPE))
        }
        PropertyOperator::IsSet => Expr::expr(value).is_not_null(),
        PropertyOperator::IsNotSet => Expr::expr(value).is_null(),
    }
}

/// Bucket index of `column` as a `BIGINT`.
///
/// Rows are expected to be restricted to `[buckets[0], buckets[N])` already;
/// anything past the last inner boundary lands in bucket `N - 1`.
pub fn bucket_index(column: SimpleExpr, buckets: &[DateTime<Utc>]) -> SimpleExpr {
    let total = buckets.len().saturating_sub(1);
    let inner = buckets.iter().skip(1).take(total.saturating_sub(1));

    let mut arms = inner.enumerate();
    let index: SimpleExpr = match arms.next() {
        None => Expr::val(0i64).into(),
        Some((i, boundary)) => {
            let first = Expr::case(
                Expr::expr(column.clone()).lt(format_timestamp(*boundary)),
                Expr::val(i as i64),
            );
            arms.fold(first, |case, (i, boundary)| {
                case.case(
                    Expr::expr(column.clone()).lt(format_timestamp(*boundary)),
                    Expr::val(i as i64),
                )
            })
            .finally(Expr::val(total.saturating_sub(1) as i64))
            .into()
        }
    };

    Func::cast_as(index, Alias::new("BIGINT")).into()
}
