use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::engine::ServiceUpdate;
use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    RegisterService {
        id: Ulid,
        name: String,
        duration_minutes: u32,
        price_cents: u64,
    },
    UpdateService {
        id: Ulid,
        update: ServiceUpdate,
    },
    DeactivateService {
        id: Ulid,
    },
    ListServices,
    CreateAppointment(BookingRequest),
    RescheduleAppointment {
        id: Ulid,
        start: Ms,
    },
    TransitionAppointment {
        id: Ulid,
        transition: Transition,
    },
    GetAppointment {
        id: Ulid,
    },
    ListAppointments {
        resource_id: Ulid,
        start: Ms,
        end: Ms,
        status: Option<AppointmentStatus>,
    },
    FreeSlots {
        resource_id: Ulid,
        service_id: Ulid,
        start: Ms,
        end: Ms,
    },
    CheckSlot {
        resource_id: Ulid,
        service_id: Ulid,
        start: Ms,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

const SERVICE_COLUMNS: &[&str] = &["id", "name", "duration_minutes", "price_cents"];
const APPOINTMENT_COLUMNS: &[&str] = &["id", "resource_id", "service_id", "customer_id", "start"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "services" => {
            let row =
                bind_insert_columns("services", SERVICE_COLUMNS, 3, &insert.columns, values)?;
            let price_cents = match row[3] {
                Some(v) => parse_u64(v)?,
                None => 0,
            };
            Ok(Command::RegisterService {
                id: parse_ulid(required(&row, SERVICE_COLUMNS, 0)?)?,
                name: parse_string(required(&row, SERVICE_COLUMNS, 1)?)?,
                duration_minutes: parse_u32(required(&row, SERVICE_COLUMNS, 2)?)?,
                price_cents,
            })
        }
        "appointments" => {
            let row = bind_insert_columns(
                "appointments",
                APPOINTMENT_COLUMNS,
                5,
                &insert.columns,
                values,
            )?;
            let col = |i| required(&row, APPOINTMENT_COLUMNS, i);
            Ok(Command::CreateAppointment(BookingRequest {
                id: parse_ulid(col(0)?)?,
                resource_id: parse_ulid(col(1)?)?,
                service_id: parse_ulid(col(2)?)?,
                customer_id: parse_ulid(col(3)?)?,
                start: parse_i64(col(4)?)?,
            }))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Line VALUES up with `schema` order. Without a column list the row is
/// positional and must carry at least `min` values.
fn bind_insert_columns<'a>(
    table: &'static str,
    schema: &[&str],
    min: usize,
    columns: &[ast::Ident],
    values: &'a [Expr],
) -> Result<Vec<Option<&'a Expr>>, SqlError> {
    let mut row = vec![None; schema.len()];

    if columns.is_empty() {
        if values.len() < min || values.len() > schema.len() {
            return Err(SqlError::WrongArity(table, min, values.len()));
        }
        for (slot, value) in row.iter_mut().zip(values) {
            *slot = Some(value);
        }
        return Ok(row);
    }

    if columns.len() != values.len() {
        return Err(SqlError::WrongArity(table, columns.len(), values.len()));
    }
    for (ident, value) in columns.iter().zip(values) {
        let name = ident.value.to_lowercase();
        let pos = schema
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| SqlError::UnknownColumn(name.clone()))?;
        if row[pos].replace(value).is_some() {
            return Err(SqlError::DuplicateColumn(name));
        }
    }
    Ok(row)
}

fn required<'a>(
    row: &[Option<&'a Expr>],
    schema: &[&'static str],
    i: usize,
) -> Result<&'a Expr, SqlError> {
    row[i].ok_or(SqlError::MissingColumn(schema[i]))
}

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let id = extract_where_id(selection)?;

    let mut columns = Vec::with_capacity(assignments.len());
    for a in assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        columns.push((col, &a.value));
    }
    if columns.is_empty() {
        return Err(SqlError::Parse("UPDATE without SET".into()));
    }

    match table.as_str() {
        "services" => {
            let mut update = ServiceUpdate::default();
            for (col, value) in columns {
                match col.as_str() {
                    "name" => update.name = Some(parse_string(value)?),
                    "duration_minutes" => update.duration_minutes = Some(parse_u32(value)?),
                    "price_cents" => update.price_cents = Some(parse_u64(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::UpdateService { id, update })
        }
        "appointments" => {
            if columns.len() > 1 {
                return Err(SqlError::Unsupported(
                    "update one of start or status per statement".into(),
                ));
            }
            let (col, value) = &columns[0];
            match col.as_str() {
                "start" => Ok(Command::RescheduleAppointment {
                    id,
                    start: parse_i64(value)?,
                }),
                "status" => {
                    let raw = parse_string(value)?;
                    let status = AppointmentStatus::parse(&raw)
                        .ok_or_else(|| SqlError::Parse(format!("unknown status: {raw}")))?;
                    let transition = match status {
                        AppointmentStatus::Confirmed => Transition::Confirm,
                        AppointmentStatus::Cancelled => Transition::Cancel,
                        AppointmentStatus::Completed => Transition::Complete,
                        AppointmentStatus::Scheduled => {
                            return Err(SqlError::Unsupported(
                                "appointments cannot move back to scheduled".into(),
                            ));
                        }
                    };
                    Ok(Command::TransitionAppointment { id, transition })
                }
                _ => Err(SqlError::UnknownColumn(col.clone())),
            }
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "services" => Ok(Command::DeactivateService { id }),
        "appointments" => Ok(Command::TransitionAppointment {
            id,
            transition: Transition::Cancel,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Conjunctive `WHERE` filters understood by the SELECT tables.
#[derive(Default)]
struct Filters {
    id: Option<Ulid>,
    resource_id: Option<Ulid>,
    service_id: Option<Ulid>,
    start_eq: Option<Ms>,
    start_from: Option<Ms>,
    end_until: Option<Ms>,
    status: Option<AppointmentStatus>,
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut f = Filters::default();
    if let Some(selection) = &select.selection {
        extract_filters(selection, &mut f)?;
    }

    match table.as_str() {
        "services" => Ok(Command::ListServices),
        "appointments" => {
            if let Some(id) = f.id {
                return Ok(Command::GetAppointment { id });
            }
            Ok(Command::ListAppointments {
                resource_id: f.resource_id.ok_or(SqlError::MissingFilter("resource_id"))?,
                start: f.start_from.ok_or(SqlError::MissingFilter("start"))?,
                end: f.end_until.ok_or(SqlError::MissingFilter("end"))?,
                status: f.status,
            })
        }
        "availability" => Ok(Command::FreeSlots {
            resource_id: f.resource_id.ok_or(SqlError::MissingFilter("resource_id"))?,
            service_id: f.service_id.ok_or(SqlError::MissingFilter("service_id"))?,
            start: f.start_from.ok_or(SqlError::MissingFilter("start"))?,
            end: f.end_until.ok_or(SqlError::MissingFilter("end"))?,
        }),
        "conflicts" => Ok(Command::CheckSlot {
            resource_id: f.resource_id.ok_or(SqlError::MissingFilter("resource_id"))?,
            service_id: f.service_id.ok_or(SqlError::MissingFilter("service_id"))?,
            start: f.start_eq.ok_or(SqlError::MissingFilter("start"))?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn extract_filters(expr: &Expr, f: &mut Filters) -> Result<(), SqlError> {
    let Expr::BinaryOp { left, op, right } = expr else {
        return Ok(());
    };
    if *op == ast::BinaryOperator::And {
        extract_filters(left, f)?;
        return extract_filters(right, f);
    }
    let Some(col) = expr_column_name(left) else {
        return Ok(());
    };
    match (op, col.as_str()) {
        (ast::BinaryOperator::Eq, "id") => f.id = Some(parse_ulid(right)?),
        (ast::BinaryOperator::Eq, "resource_id") => f.resource_id = Some(parse_ulid(right)?),
        (ast::BinaryOperator::Eq, "service_id") => f.service_id = Some(parse_ulid(right)?),
        (ast::BinaryOperator::Eq, "start") => f.start_eq = Some(parse_i64(right)?),
        (ast::BinaryOperator::GtEq, "start") => f.start_from = Some(parse_i64(right)?),
        (ast::BinaryOperator::LtEq, "end") => f.end_until = Some(parse_i64(right)?),
        (ast::BinaryOperator::Eq, "status") => {
            let raw = parse_string(right)?;
            f.status = Some(
                AppointmentStatus::parse(&raw)
                    .ok_or_else(|| SqlError::Parse(format!("unknown status: {raw}")))?,
            );
        }
        _ => {}
    }
    Ok(())
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
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
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

/// Values of the first row. Multi-row inserts are rejected so a batch can
/// never half-succeed.
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

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    match selection.as_ref() {
        Some(Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
        _ => Err(SqlError::MissingFilter("id")),
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

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected ULID string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _) | Value::SingleQuotedString(s)) => s
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_u64(expr: &Expr) -> Result<u64, SqlError> {
    let v = parse_i64(expr)?;
    u64::try_from(v).map_err(|_| SqlError::Parse(format!("{v} must not be negative")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("missing column: {0}")]
    MissingColumn(&'static str),
    #[error("column specified more than once: {0}")]
    DuplicateColumn(String),
    #[error("{0}: expected {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const OTHER: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn id() -> Ulid {
        Ulid::from_string(ID).unwrap()
    }

    fn other() -> Ulid {
        Ulid::from_string(OTHER).unwrap()
    }

    #[test]
    fn parse_register_service() {
        let sql = format!(
            "INSERT INTO services (id, name, duration_minutes, price_cents) VALUES ('{ID}', 'Beard trim', 20, 1500)"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::RegisterService {
                id: id(),
                name: "Beard trim".into(),
                duration_minutes: 20,
                price_cents: 1500,
            }
        );
    }

    #[test]
    fn parse_register_service_default_price() {
        let sql = format!("INSERT INTO services (id, name, duration_minutes) VALUES ('{ID}', 'Consult', 45)");
        match parse_sql(&sql).unwrap() {
            Command::RegisterService { price_cents, .. } => assert_eq!(price_cents, 0),
            cmd => panic!("expected RegisterService, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_register_service_negative_duration_fails() {
        let sql = format!("INSERT INTO services (id, name, duration_minutes) VALUES ('{ID}', 'x', -5)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_update_service_partial() {
        let sql = format!("UPDATE services SET duration_minutes = 40 WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateService {
                id: id(),
                update: ServiceUpdate {
                    duration_minutes: Some(40),
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn parse_update_service_unknown_column() {
        let sql = format!("UPDATE services SET colour = 'red' WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn(c)) if c == "colour"));
    }

    #[test]
    fn parse_deactivate_service() {
        let sql = format!("DELETE FROM services WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeactivateService { id: id() });
    }

    #[test]
    fn parse_list_services() {
        assert_eq!(parse_sql("SELECT * FROM services").unwrap(), Command::ListServices);
    }

    #[test]
    fn parse_create_appointment() {
        let sql = format!(
            "INSERT INTO appointments (id, resource_id, service_id, customer_id, start) VALUES ('{ID}', '{OTHER}', '{OTHER}', '{ID}', 36000000)"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::CreateAppointment(BookingRequest {
                id: id(),
                resource_id: other(),
                service_id: other(),
                customer_id: id(),
                start: 36_000_000,
            })
        );
    }

    #[test]
    fn parse_create_appointment_short_row_fails() {
        let sql = format!("INSERT INTO appointments VALUES ('{ID}', '{OTHER}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity("appointments", 5, 2))));

        let sql = format!("INSERT INTO appointments (id, resource_id) VALUES ('{ID}', '{OTHER}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingColumn("service_id"))));
    }

    #[test]
    fn parse_create_appointment_reordered_columns() {
        let sql = format!(
            "INSERT INTO appointments (start, customer_id, id, service_id, resource_id) \
             VALUES (36000000, '{ID}', '{OTHER}', '{ID}', '{OTHER}')"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::CreateAppointment(BookingRequest {
                id: other(),
                resource_id: other(),
                service_id: id(),
                customer_id: id(),
                start: 36_000_000,
            })
        );
    }

    #[test]
    fn parse_register_service_reordered_columns() {
        let sql = format!(
            "INSERT INTO services (price_cents, duration_minutes, name, id) VALUES (2500, 45, 'Colour', '{ID}')"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::RegisterService {
                id: id(),
                name: "Colour".into(),
                duration_minutes: 45,
                price_cents: 2500,
            }
        );
    }

    #[test]
    fn parse_insert_rejects_unknown_and_duplicate_columns() {
        let sql = format!("INSERT INTO services (id, name, minutes) VALUES ('{ID}', 'Cut', 30)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn(c)) if c == "minutes"));

        let sql = format!(
            "INSERT INTO services (id, name, duration_minutes, name) VALUES ('{ID}', 'Cut', 30, 'Trim')"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::DuplicateColumn(c)) if c == "name"));

        let sql = format!("INSERT INTO services (id, name) VALUES ('{ID}', 'Cut', 30)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity("services", 2, 3))));
    }

    #[test]
    fn parse_multi_row_insert_rejected() {
        let sql = format!(
            "INSERT INTO services (id, name, duration_minutes) VALUES ('{ID}', 'a', 10), ('{OTHER}', 'b', 20)"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_reschedule() {
        let sql = format!("UPDATE appointments SET start = 37800000 WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::RescheduleAppointment {
                id: id(),
                start: 37_800_000,
            }
        );
    }

    #[test]
    fn parse_status_transitions() {
        for (status, transition) in [
            ("confirmed", Transition::Confirm),
            ("cancelled", Transition::Cancel),
            ("completed", Transition::Complete),
        ] {
            let sql = format!("UPDATE appointments SET status = '{status}' WHERE id = '{ID}'");
            assert_eq!(
                parse_sql(&sql).unwrap(),
                Command::TransitionAppointment { id: id(), transition }
            );
        }
    }

    #[test]
    fn parse_status_back_to_scheduled_rejected() {
        let sql = format!("UPDATE appointments SET status = 'scheduled' WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_update_without_id_fails() {
        let sql = "UPDATE appointments SET status = 'confirmed'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_delete_appointment_is_cancel() {
        let sql = format!("DELETE FROM appointments WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::TransitionAppointment {
                id: id(),
                transition: Transition::Cancel,
            }
        );
    }

    #[test]
    fn parse_get_appointment() {
        let sql = format!("SELECT * FROM appointments WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::GetAppointment { id: id() });
    }

    #[test]
    fn parse_list_appointments() {
        let sql = format!(
            "SELECT * FROM appointments WHERE resource_id = '{ID}' AND start >= 1000 AND \"end\" <= 2000 AND status = 'confirmed'"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::ListAppointments {
                resource_id: id(),
                start: 1000,
                end: 2000,
                status: Some(AppointmentStatus::Confirmed),
            }
        );
    }

    #[test]
    fn parse_list_appointments_requires_window() {
        let sql = format!("SELECT * FROM appointments WHERE resource_id = '{ID}' AND start >= 1000");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("end"))));
    }

    #[test]
    fn parse_free_slots() {
        let sql = format!(
            "SELECT * FROM availability WHERE resource_id = '{ID}' AND service_id = '{OTHER}' AND start >= 0 AND \"end\" <= 86400000"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::FreeSlots {
                resource_id: id(),
                service_id: other(),
                start: 0,
                end: 86_400_000,
            }
        );
    }

    #[test]
    fn parse_check_slot() {
        let sql = format!(
            "SELECT * FROM conflicts WHERE resource_id = '{ID}' AND service_id = '{OTHER}' AND start = 36000000"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::CheckSlot {
                resource_id: id(),
                service_id: other(),
                start: 36_000_000,
            }
        );
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO bookings (id) VALUES ('{ID}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(t)) if t == "bookings"));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
