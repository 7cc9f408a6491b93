use std::str::FromStr;

use rust_decimal::Decimal;
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectServices,
    InsertService(Service),
    UpdateServicePrice { id: String, price: Decimal },
    DeleteService { id: String },
    SelectSlots { date: String },
    InsertReservation(BookingRequest),
    InsertManualReservation(ManualReservation),
    UpdateReservationStatus { id: String, action: StatusAction },
    SelectReservations,
    SelectArchive,
    SelectDashboard,
}

/// Default column order for `INSERT INTO reservations VALUES (...)`.
const BOOKING_COLUMNS: [&str; 8] = ["name", "email", "phone", "make", "model", "services", "date", "time"];
const MANUAL_COLUMNS: [&str; 7] = ["name", "phone", "make", "model", "services", "date", "time"];
const SERVICE_COLUMNS: [&str; 5] = ["id", "name", "duration", "price", "description"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let columns: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();

    match table.as_str() {
        "services" => {
            let row = Columns::bind(&columns, &SERVICE_COLUMNS, &values, "services")?;
            Ok(Command::InsertService(Service {
                id: row.require_text("id")?,
                name: row.require_text("name")?,
                duration_minutes: parse_u32(row.require("duration")?)?,
                price: row.get("price").map(parse_decimal).transpose()?.unwrap_or_default(),
                description: row.text("description")?,
            }))
        }
        "reservations" => {
            let row = Columns::bind(&columns, &BOOKING_COLUMNS, &values, "reservations")?;
            Ok(Command::InsertReservation(BookingRequest {
                customer_name: row.text("name")?,
                email: row.text("email")?,
                phone: row.text("phone")?,
                vehicle_make: row.text("make")?,
                vehicle_model: row.text("model")?,
                service_ids: split_service_ids(&row.text("services")?),
                date: row.text("date")?,
                time: row.text("time")?,
            }))
        }
        "manual_reservations" => {
            let row = Columns::bind(&columns, &MANUAL_COLUMNS, &values, "manual_reservations")?;
            Ok(Command::InsertManualReservation(ManualReservation {
                customer_name: row.text("name")?,
                phone: row.text("phone")?,
                vehicle_make: row.text("make")?,
                vehicle_model: row.text("model")?,
                service_ids: split_service_ids(&row.text("services")?),
                date: row.text("date")?,
                time: row.text("time")?,
            }))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_eq(&delete.selection, "id")?;

    match table.as_str() {
        "services" => Ok(Command::DeleteService { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let id = extract_where_eq(selection, "id")?;
    let [assignment] = assignments else {
        return Err(SqlError::Unsupported("UPDATE must set exactly one column".into()));
    };
    let column = match &assignment.target {
        AssignmentTarget::ColumnName(name) => object_name_last(name),
        AssignmentTarget::Tuple(_) => None,
    }
    .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;

    match (table.as_str(), column.as_str()) {
        ("services", "price") => Ok(Command::UpdateServicePrice {
            id,
            price: parse_decimal(&assignment.value)?,
        }),
        ("reservations", "status") => Ok(Command::UpdateReservationStatus {
            id,
            action: StatusAction::parse(&parse_text(&assignment.value)?),
        }),
        ("services", _) | ("reservations", _) => {
            Err(SqlError::Unsupported(format!("cannot update {table}.{column}")))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    match table.as_str() {
        "services" => Ok(Command::SelectServices),
        "slots" => Ok(Command::SelectSlots {
            date: extract_where_eq(&select.selection, "date")?,
        }),
        "reservations" => Ok(Command::SelectReservations),
        "archive" => Ok(Command::SelectArchive),
        "dashboard" => Ok(Command::SelectDashboard),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Column binding ────────────────────────────────────────────

/// One VALUES row bound to column names, either the explicit column list or
/// the table's default order.
struct Columns<'a> {
    pairs: Vec<(&'a str, &'a Expr)>,
}

impl<'a> Columns<'a> {
    fn bind(
        explicit: &'a [String],
        defaults: &'static [&'static str],
        values: &'a [Expr],
        table: &'static str,
    ) -> Result<Self, SqlError> {
        let names: Vec<&'a str> = if explicit.is_empty() {
            defaults.to_vec()
        } else {
            explicit.iter().map(String::as_str).collect()
        };
        if values.len() != names.len() {
            return Err(SqlError::WrongArity(table, names.len(), values.len()));
        }
        if let Some(unknown) = names.iter().copied().find(|n| !defaults.iter().any(|d| d == n)) {
            return Err(SqlError::UnknownColumn(table, unknown.to_string()));
        }
        Ok(Self {
            pairs: names.into_iter().zip(values.iter()).collect(),
        })
    }

    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.pairs.iter().find(|(n, _)| *n == column).map(|(_, e)| *e)
    }

    fn require(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingColumn(column))
    }

    /// Text value of a column; absent or NULL reads as empty.
    fn text(&self, column: &str) -> Result<String, SqlError> {
        self.get(column).map(parse_text).transpose().map(Option::unwrap_or_default)
    }

    fn require_text(&self, column: &'static str) -> Result<String, SqlError> {
        parse_text(self.require(column)?)
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

/// Text of `WHERE <column> = <value>`.
fn extract_where_eq(selection: &Option<Expr>, column: &'static str) -> Result<String, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter(column))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some(column) => parse_text(right),
        Expr::Nested(inner) => extract_where_eq(&Some((**inner).clone()), column),
        _ => Err(SqlError::MissingFilter(column)),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(Value::Null) => Ok(String::new()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_decimal(expr: &Expr) -> Result<Decimal, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => {
                Decimal::from_str(s.trim()).map_err(|e| SqlError::Parse(format!("bad decimal {s:?}: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_decimal(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v: i64 = match extract_value(expr) {
        Some(Value::Number(s, _)) | Some(Value::SingleQuotedString(s)) => s
            .trim()
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad integer {s:?}: {e}")))?,
        Some(value) => return Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        None => return Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    };
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(&'static str, String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(t, c) => write!(f, "{t}: unknown column {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
