//! Statement builders.
//!
//! Every function here renders one statement (or statement pair, for
//! translated tables) against a schema, appending its parameters to a
//! shared values list so placeholders stay `$1`-based and contiguous
//! across compound statements.

use std::collections::BTreeMap;
use std::sync::Arc;

use quarry_core::{Field, FieldFlags, Filter, GroupOp, Ordering, Query, QueryOp, Schema, Value};
use quarry_orm::{Context, OrmError, Result, ReturnType};

/// Picks the effective namespace for a statement.
///
/// A forced context namespace beats everything; otherwise the schema's
/// own namespace wins, then the context's, then the store's, then the
/// backend default.
#[must_use]
pub fn resolve_namespace(
    schema: &Schema,
    context: &Context,
    store_namespace: Option<&str>,
    default: &str,
) -> String {
    if context.force_namespace {
        if let Some(namespace) = &context.namespace {
            return namespace.clone();
        }
    }
    schema
        .namespace()
        .or(context.namespace.as_deref())
        .or(store_namespace)
        .unwrap_or(default)
        .to_string()
}

fn column_sql(field: &Arc<Field>, use_i18n: bool) -> String {
    let code = field.code();
    if use_i18n && field.test_flag(FieldFlags::TRANSLATABLE) {
        format!("i18n.\"{code}\"")
    } else {
        format!("\"{code}\"")
    }
}

/// Renders the select column list: schema order (skipping virtual
/// fields) unless the context names fields explicitly, with `AS`
/// aliases wherever a column code differs from its field name.
pub fn fields_to_sql(schema: &Schema, context: &Context, use_i18n: bool) -> Result<Vec<String>> {
    let all = schema.fields();
    let names: Vec<String> = match &context.fields {
        Some(names) => names.clone(),
        None => all
            .iter()
            .filter(|(_, field)| !field.test_flag(FieldFlags::VIRTUAL))
            .map(|(name, _)| name.clone())
            .collect(),
    };
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let field = all
            .get(&name)
            .ok_or_else(|| OrmError::InvalidField(name.clone()))?;
        let mut column = column_sql(field, use_i18n);
        if field.code() != field.name() {
            column.push_str(&format!(" AS \"{}\"", field.name()));
        }
        columns.push(column);
    }
    Ok(columns)
}

fn text_pattern(query: &Query, pattern: &str) -> Result<Value> {
    let text = query
        .value
        .as_text()
        .ok_or_else(|| OrmError::InvalidField(query.name.clone()))?;
    Ok(Value::Text(pattern.replace('*', text)))
}

fn predicate(column: &str, query: &Query, values: &mut Vec<Value>) -> Result<String> {
    let placeholder = |values: &Vec<Value>| format!("${}", values.len());
    let simple = |op: &str, values: &mut Vec<Value>| {
        values.push(query.value.clone());
        format!("{column}{op}${}", values.len())
    };
    let spaced = |op: &str, values: &mut Vec<Value>| {
        values.push(query.value.clone());
        format!("{column} {op} ${}", values.len())
    };
    Ok(match query.op {
        QueryOp::Is => simple("=", values),
        QueryOp::IsNot => simple("!=", values),
        QueryOp::GreaterThan | QueryOp::After => simple(">", values),
        QueryOp::GreaterThanOrEqual => simple(">=", values),
        QueryOp::LessThan | QueryOp::Before => simple("<", values),
        QueryOp::LessThanOrEqual => simple("<=", values),
        QueryOp::Matches => spaced("~", values),
        QueryOp::IsIn => {
            values.push(query.value.clone());
            format!("{column} = ANY({})", placeholder(values))
        }
        QueryOp::IsNotIn => {
            values.push(query.value.clone());
            format!("{column} != ALL({})", placeholder(values))
        }
        QueryOp::Between => {
            let (low, high) = match &query.value {
                Value::List(bounds) if bounds.len() == 2 => (bounds[0].clone(), bounds[1].clone()),
                _ => return Err(OrmError::InvalidField(query.name.clone())),
            };
            values.push(low);
            let low_ph = placeholder(values);
            values.push(high);
            format!("{column} BETWEEN {low_ph} AND {}", placeholder(values))
        }
        QueryOp::Contains => {
            values.push(text_pattern(query, "%*%")?);
            format!("{column} LIKE {}", placeholder(values))
        }
        QueryOp::ContainsInsensitive => {
            values.push(text_pattern(query, "%*%")?);
            format!("{column} ILIKE {}", placeholder(values))
        }
        QueryOp::Startswith => {
            values.push(text_pattern(query, "*%")?);
            format!("{column} LIKE {}", placeholder(values))
        }
        QueryOp::Endswith => {
            values.push(text_pattern(query, "%*")?);
            format!("{column} LIKE {}", placeholder(values))
        }
        QueryOp::DoesNotStartwith => {
            values.push(text_pattern(query, "*%")?);
            format!("{column} NOT LIKE {}", placeholder(values))
        }
        QueryOp::DoesNotEndwith => {
            values.push(text_pattern(query, "%*")?);
            format!("{column} NOT LIKE {}", placeholder(values))
        }
    })
}

/// Renders a filter as a WHERE expression, appending its parameters.
/// Returns an empty string for a null filter.
pub fn query_to_sql(
    schema: &Schema,
    filter: &Filter,
    use_i18n: bool,
    values: &mut Vec<Value>,
) -> Result<String> {
    match filter {
        Filter::Null => Ok(String::new()),
        Filter::Leaf(query) => {
            if query.is_null() {
                return Ok(String::new());
            }
            let field = schema
                .field(&query.name)
                .ok_or_else(|| OrmError::InvalidField(query.name.clone()))?;
            if let Some(rewrite) = field.query() {
                let rewritten = rewrite(query);
                return query_to_sql(schema, &rewritten, use_i18n, values);
            }
            let column = column_sql(&field, use_i18n);
            predicate(&column, query, values)
        }
        Filter::Group(group) => {
            let joiner = match group.op {
                GroupOp::And => " AND ",
                GroupOp::Or => " OR ",
            };
            let mut parts = Vec::with_capacity(group.queries.len());
            for sub in &group.queries {
                let rendered = query_to_sql(schema, sub, use_i18n, values)?;
                if rendered.is_empty() {
                    continue;
                }
                if matches!(sub, Filter::Group(_)) {
                    parts.push(format!("({rendered})"));
                } else {
                    parts.push(rendered);
                }
            }
            Ok(parts.join(joiner))
        }
    }
}

/// Renders an ORDER BY expression.
pub fn order_to_sql(
    schema: &Schema,
    order: &[(String, Ordering)],
    use_i18n: bool,
) -> Result<String> {
    let mut parts = Vec::with_capacity(order.len());
    for (name, direction) in order {
        let field = schema
            .field(name)
            .ok_or_else(|| OrmError::InvalidField(name.clone()))?;
        let direction = match direction {
            Ordering::Asc => "ASC",
            Ordering::Desc => "DESC",
        };
        parts.push(format!("{} {direction}", column_sql(&field, use_i18n)));
    }
    Ok(parts.join(", "))
}

/// Renders `"column"=$n` pairs, appending each value.
pub fn args_to_sql(pairs: &[(String, Value)], joiner: &str, values: &mut Vec<Value>) -> String {
    pairs
        .iter()
        .map(|(code, value)| {
            values.push(value.clone());
            format!("\"{code}\"=${}", values.len())
        })
        .collect::<Vec<_>>()
        .join(joiner)
}

/// Splits staged changes into standard and translated column/value
/// pairs, in field-name order.  Virtual fields never reach a statement.
pub fn group_changes(
    schema: &Schema,
    changes: &BTreeMap<String, (Value, Value)>,
) -> Result<(Vec<(String, Value)>, Vec<(String, Value)>)> {
    let mut standard = Vec::new();
    let mut translated = Vec::new();
    for (name, (_, staged)) in changes {
        let field = schema
            .field(name)
            .ok_or_else(|| OrmError::InvalidField(name.clone()))?;
        if field.test_flag(FieldFlags::VIRTUAL) {
            continue;
        }
        let pair = (field.code(), staged.clone());
        if field.test_flag(FieldFlags::TRANSLATABLE) {
            translated.push(pair);
        } else {
            standard.push(pair);
        }
    }
    Ok((standard, translated))
}

/// Builds the SELECT statement a context describes.
pub fn select_sql(schema: &Schema, context: &Context, namespace: &str) -> Result<(String, Vec<Value>)> {
    let counting = context.returning == ReturnType::Count;
    let use_i18n = schema.has_translations() && !counting;
    let mut values = Vec::new();

    let columns = if counting {
        "COUNT(*) AS \"count\"".to_string()
    } else {
        fields_to_sql(schema, context, use_i18n)?.join(", ")
    };

    let mut sql = format!(
        "SELECT {columns}\nFROM \"{namespace}\".\"{table}\"\n",
        table = schema.resource_name()
    );

    if use_i18n {
        values.push(Value::Text(context.locale().to_string()));
        let join = schema
            .key_fields()
            .iter()
            .map(|field| {
                let code = field.code();
                format!("i18n.\"{code}\"=\"{code}\"")
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        sql.push_str(&format!(
            "LEFT JOIN \"{namespace}\".\"{i18n_table}\" i18n ON ({join} AND i18n.\"locale\"=${locale})\n",
            i18n_table = schema.i18n_name(),
            locale = values.len()
        ));
    }

    let where_sql = query_to_sql(schema, &context.filter, use_i18n, &mut values)?;
    if !where_sql.is_empty() {
        sql.push_str(&format!("WHERE ({where_sql})\n"));
    }

    if let Some(order) = &context.order {
        let order_sql = order_to_sql(schema, order, use_i18n)?;
        if !order_sql.is_empty() {
            sql.push_str(&format!("ORDER BY {order_sql}\n"));
        }
    }

    if let Some(start) = context.start().filter(|start| *start > 0) {
        sql.push_str(&format!("START {start}\n"));
    }
    if let Some(limit) = context.limit().filter(|limit| *limit > 0) {
        sql.push_str(&format!("LIMIT {limit}\n"));
    }

    Ok((format!("{};", sql.trim_end()), values))
}

/// Builds the INSERT for a new record.  Translated changes route
/// through a CTE so the freshly assigned key can seed the i18n row.
pub fn insert_sql(
    schema: &Schema,
    changes: &BTreeMap<String, (Value, Value)>,
    namespace: &str,
    locale: &str,
) -> Result<(String, Vec<Value>)> {
    let (standard, translated) = group_changes(schema, changes)?;
    let mut values = Vec::new();
    let table = schema.resource_name();

    let columns = standard
        .iter()
        .map(|(code, _)| format!("\"{code}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = standard
        .iter()
        .map(|(_, value)| {
            values.push(value.clone());
            format!("${}", values.len())
        })
        .collect::<Vec<_>>()
        .join(", ");

    if translated.is_empty() {
        let sql = format!(
            "INSERT INTO \"{namespace}\".\"{table}\" (\n   {columns}\n)\nVALUES({placeholders})\nRETURNING *;"
        );
        return Ok((sql, values));
    }

    let inner = if standard.is_empty() {
        format!("   INSERT INTO \"{namespace}\".\"{table}\" DEFAULT VALUES\n   RETURNING *\n")
    } else {
        format!(
            "   INSERT INTO \"{namespace}\".\"{table}\" (\n       {columns}\n   )\n   VALUES({placeholders})\n   RETURNING *\n"
        )
    };

    let mut i18n_columns = Vec::new();
    let mut i18n_selects = Vec::new();
    for (code, value) in &translated {
        values.push(value.clone());
        i18n_columns.push(format!("\"{code}\""));
        i18n_selects.push(format!("${}", values.len()));
    }
    values.push(Value::Text(locale.to_string()));
    i18n_columns.push("\"locale\"".to_string());
    i18n_selects.push(format!("${}", values.len()));
    for field in schema.key_fields() {
        let code = field.code();
        i18n_columns.push(format!("\"{code}\""));
        i18n_selects.push(format!("inserted.\"{code}\""));
    }

    let sql = format!(
        "WITH inserted AS (\n{inner})\nINSERT INTO \"{namespace}\".\"{i18n_table}\" (\n   {i18n_columns}\n)\nSELECT {i18n_selects} FROM inserted\nRETURNING *;",
        i18n_table = schema.i18n_name(),
        i18n_columns = i18n_columns.join(", "),
        i18n_selects = i18n_selects.join(", ")
    );
    Ok((sql, values))
}

/// Builds the UPDATE for an existing record, pairing a second
/// statement against the i18n table when translated changes are
/// staged.
pub fn update_sql(
    schema: &Schema,
    changes: &BTreeMap<String, (Value, Value)>,
    key_pairs: &[(String, Value)],
    namespace: &str,
    locale: &str,
) -> Result<(String, Vec<Value>)> {
    let (standard, translated) = group_changes(schema, changes)?;
    let mut values = Vec::new();
    let mut statements = Vec::new();

    if !standard.is_empty() {
        let set = args_to_sql(&standard, ", ", &mut values);
        let filter = args_to_sql(key_pairs, " AND ", &mut values);
        statements.push(format!(
            "UPDATE \"{namespace}\".\"{table}\"\nSET {set}\nWHERE ({filter})\nRETURNING *;",
            table = schema.resource_name()
        ));
    }

    if !translated.is_empty() {
        let set = args_to_sql(&translated, ", ", &mut values);
        let mut i18n_keys = key_pairs.to_vec();
        i18n_keys.push(("locale".to_string(), Value::Text(locale.to_string())));
        let filter = args_to_sql(&i18n_keys, " AND ", &mut values);
        statements.push(format!(
            "UPDATE \"{namespace}\".\"{i18n_table}\"\nSET {set}\nWHERE ({filter})\nRETURNING *;",
            i18n_table = schema.i18n_name()
        ));
    }

    Ok((statements.join("\n"), values))
}

/// Builds the DELETE for a record, removing the i18n rows first when
/// the schema is translated.  Both statements share one parameter set.
pub fn delete_record_sql(
    schema: &Schema,
    key_pairs: &[(String, Value)],
    namespace: &str,
) -> (String, Vec<Value>) {
    let mut values = Vec::new();
    let filter = args_to_sql(key_pairs, " AND ", &mut values);
    let table = schema.resource_name();
    let sql = if schema.has_translations() {
        format!(
            "DELETE FROM \"{namespace}\".\"{i18n_table}\" WHERE ({filter});\nDELETE FROM \"{namespace}\".\"{table}\" WHERE ({filter});",
            i18n_table = schema.i18n_name()
        )
    } else {
        format!("DELETE FROM \"{namespace}\".\"{table}\" WHERE ({filter});")
    };
    (sql, values)
}

/// Builds the DELETE for every record a filter matches.  Translated
/// rows go first, keyed through a subselect on the base table.
pub fn delete_collection_sql(
    schema: &Schema,
    filter: &Filter,
    namespace: &str,
) -> Result<(String, Vec<Value>)> {
    let mut values = Vec::new();
    let where_sql = query_to_sql(schema, filter, false, &mut values)?;
    let where_clause = if where_sql.is_empty() {
        String::new()
    } else {
        format!(" WHERE ({where_sql})")
    };
    let table = schema.resource_name();
    let sql = if schema.has_translations() {
        let keys = schema
            .key_fields()
            .iter()
            .map(|field| format!("\"{}\"", field.code()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "DELETE FROM \"{namespace}\".\"{i18n_table}\" WHERE ({keys}) IN (SELECT {keys} FROM \"{namespace}\".\"{table}\"{where_clause});\nDELETE FROM \"{namespace}\".\"{table}\"{where_clause};",
            i18n_table = schema.i18n_name()
        )
    } else {
        format!("DELETE FROM \"{namespace}\".\"{table}\"{where_clause};")
    };
    Ok((sql, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_schema() -> Arc<Schema> {
        Schema::build("User")
            .field(Field::new("id").with_flags(FieldFlags::KEY))
            .field(Field::new("username"))
            .finish()
    }

    #[test]
    fn test_query_to_sql_renders_groups() {
        let schema = user_schema();
        let filter = Query::new("username").is("bob") | Query::new("username").is("sally");
        let mut values = Vec::new();
        let sql = query_to_sql(&schema, &filter, false, &mut values).unwrap();
        assert_eq!(sql, "\"username\"=$1 OR \"username\"=$2");
        assert_eq!(
            values,
            vec![Value::Text("bob".into()), Value::Text("sally".into())]
        );
    }

    #[test]
    fn test_query_to_sql_parenthesizes_nested_groups() {
        let schema = user_schema();
        let nested = Query::new("username").is("bob") | Query::new("username").is("sally");
        let filter = Query::new("id").gt(10_i64) & nested;
        let mut values = Vec::new();
        let sql = query_to_sql(&schema, &filter, false, &mut values).unwrap();
        assert_eq!(sql, "\"id\">$1 AND (\"username\"=$2 OR \"username\"=$3)");
    }

    #[test]
    fn test_query_to_sql_rejects_unknown_field() {
        let schema = user_schema();
        let filter: Filter = Query::new("missing").is(1_i64).into();
        let mut values = Vec::new();
        assert!(query_to_sql(&schema, &filter, false, &mut values).is_err());
    }

    #[test]
    fn test_between_takes_two_placeholders() {
        let schema = user_schema();
        let filter: Filter = Query::new("id").between(1_i64, 10_i64).into();
        let mut values = Vec::new();
        let sql = query_to_sql(&schema, &filter, false, &mut values).unwrap();
        assert_eq!(sql, "\"id\" BETWEEN $1 AND $2");
        assert_eq!(values, vec![Value::Int(1), Value::Int(10)]);
    }

    #[test]
    fn test_startswith_renders_like_pattern() {
        let schema = user_schema();
        let filter: Filter = Query::new("username").startswith("bo").into();
        let mut values = Vec::new();
        let sql = query_to_sql(&schema, &filter, false, &mut values).unwrap();
        assert_eq!(sql, "\"username\" LIKE $1");
        assert_eq!(values, vec![Value::Text("bo%".into())]);
    }

    #[test]
    fn test_fields_to_sql_aliases_codes() {
        let schema = Schema::build("User")
            .field(Field::new("id").with_flags(FieldFlags::KEY))
            .field(Field::new("username").with_code("name"))
            .finish();
        let context = Context::new();
        let columns = fields_to_sql(&schema, &context, false).unwrap();
        assert_eq!(columns, vec!["\"id\"", "\"name\" AS \"username\""]);
    }

    #[test]
    fn test_resolve_namespace_priority() {
        let schema = user_schema();
        let context = Context::build().namespace("auth").finish();
        assert_eq!(
            resolve_namespace(&schema, &context, Some("store_ns"), "public"),
            "auth"
        );

        let context = Context::new();
        assert_eq!(
            resolve_namespace(&schema, &context, Some("store_ns"), "public"),
            "store_ns"
        );
        assert_eq!(resolve_namespace(&schema, &context, None, "public"), "public");
    }

    #[test]
    fn test_forced_namespace_beats_schema() {
        let schema = Schema::build("User")
            .field(Field::new("id").with_flags(FieldFlags::KEY))
            .namespace("accounts")
            .finish();
        let context = Context::build().namespace("audit").force_namespace(true).finish();
        assert_eq!(resolve_namespace(&schema, &context, None, "public"), "audit");
        let plain = Context::build().namespace("audit").finish();
        assert_eq!(resolve_namespace(&schema, &plain, None, "public"), "accounts");
    }
}
