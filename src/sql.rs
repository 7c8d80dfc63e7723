use std::collections::HashMap;

use chrono::NaiveDate;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::engine::{AppointmentRequest, AvailabilityCheck, ScheduleChange, SlotQuery};
use crate::model::*;
use crate::time::{Minutes, TimeError};

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRule(AvailabilityRule),
    DeleteRule { id: Ulid },
    InsertWorkingHours(WorkingHours),
    InsertSpecialHours(SpecialHours),
    /// Either a working- or a special-hours entry.
    DeleteShopHours { id: Ulid },
    InsertService(ServiceInfo),
    InsertAppointment(AppointmentRequest),
    ChangeStatus {
        appointment_id: Ulid,
        status: AppointmentStatus,
        reason: Option<String>,
    },
    Reschedule {
        appointment_id: Ulid,
        change: ScheduleChange,
    },
    SetNotes {
        appointment_id: Ulid,
        notes: Option<String>,
    },
    DeleteAppointment { id: Ulid },
    SelectSlots(SlotQuery),
    SelectAvailability(AvailabilityCheck),
    SelectAppointment { id: Ulid },
    SelectDayAppointments { team_member_id: Ulid, date: NaiveDate },
}

// Column order assumed when an INSERT omits its column list.
const RULE_COLUMNS: &[&str] = &["id", "team_member_id", "day_of_week", "specific_date", "start_time", "end_time"];
const WORKING_HOURS_COLUMNS: &[&str] = &["id", "shop_id", "day_of_week", "start_time", "end_time", "slot_order", "is_active"];
const SPECIAL_HOURS_COLUMNS: &[&str] = &[
    "id",
    "shop_id",
    "special_date",
    "start_time",
    "end_time",
    "is_closed",
    "is_recurring_annual",
    "slot_order",
    "is_active",
];
const SERVICE_COLUMNS: &[&str] = &["id", "duration_minutes"];
const APPOINTMENT_COLUMNS: &[&str] = &[
    "id",
    "customer_user_id",
    "team_member_id",
    "service_id",
    "appointment_date",
    "start_time",
    "duration_minutes",
    "customer_notes",
];
const STATUS_CHANGE_COLUMNS: &[&str] = &["appointment_id", "status", "reason"];
const RESCHEDULE_COLUMNS: &[&str] = &["appointment_id", "appointment_date", "start_time", "duration_minutes"];
const NOTES_COLUMNS: &[&str] = &["appointment_id", "notes"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Rows a statement answers with; `None` for a bare command tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Slots,
    Availability,
    /// Appointment inserts and updates echo the stored row.
    Appointments,
}

/// Classify without binding values, so `$n` placeholders are fine.
pub fn result_shape(sql: &str) -> Option<ResultShape> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql).ok()?;
    let table = match stmts.first()? {
        Statement::Insert(insert) => insert_table_name(insert).ok()?,
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(select) => table_factor_name(&select.from.first()?.relation).ok()?,
            _ => return None,
        },
        _ => return None,
    };
    match table.as_str() {
        "slots" => Some(ResultShape::Slots),
        "availability" => Some(ResultShape::Availability),
        "appointments" | "status_changes" | "reschedules" | "appointment_notes" => Some(ResultShape::Appointments),
        _ => None,
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let schema = match table.as_str() {
        "availability_rules" => RULE_COLUMNS,
        "working_hours" => WORKING_HOURS_COLUMNS,
        "special_hours" => SPECIAL_HOURS_COLUMNS,
        "services" => SERVICE_COLUMNS,
        "appointments" => APPOINTMENT_COLUMNS,
        "status_changes" => STATUS_CHANGE_COLUMNS,
        "reschedules" => RESCHEDULE_COLUMNS,
        "appointment_notes" => NOTES_COLUMNS,
        _ => return Err(SqlError::UnknownTable(table)),
    };
    let row = Fields::from_insert(insert, schema)?;

    match table.as_str() {
        "availability_rules" => {
            let id = row.ulid("id")?;
            let team_member_id = row.ulid("team_member_id")?;
            let window = row.window()?;
            match (row.opt_int("day_of_week")?, row.opt_date("specific_date")?) {
                (Some(dow), None) => Ok(Command::InsertRule(AvailabilityRule::recurring(
                    id,
                    team_member_id,
                    day_of_week_value(dow)?,
                    window,
                ))),
                (None, Some(date)) => Ok(Command::InsertRule(AvailabilityRule::specific_date(
                    id,
                    team_member_id,
                    date,
                    window,
                ))),
                _ => Err(SqlError::Invalid {
                    column: "day_of_week",
                    reason: "exactly one of day_of_week, specific_date must be set".into(),
                }),
            }
        }
        "working_hours" => Ok(Command::InsertWorkingHours(WorkingHours {
            id: row.ulid("id")?,
            shop_id: row.ulid("shop_id")?,
            day_of_week: day_of_week_value(row.int("day_of_week")?)?,
            window: row.window()?,
            slot_order: row.slot_order()?,
            is_active: row.opt_bool("is_active")?.unwrap_or(true),
        })),
        "special_hours" => {
            let is_closed = row.opt_bool("is_closed")?.unwrap_or(false);
            // A closed day carries no times; an open one needs both.
            let window = if is_closed { None } else { Some(row.window()?) };
            Ok(Command::InsertSpecialHours(SpecialHours {
                id: row.ulid("id")?,
                shop_id: row.ulid("shop_id")?,
                special_date: row.date("special_date")?,
                is_recurring_annual: row.opt_bool("is_recurring_annual")?.unwrap_or(false),
                window,
                slot_order: row.slot_order()?,
                is_active: row.opt_bool("is_active")?.unwrap_or(true),
            }))
        }
        "services" => Ok(Command::InsertService(ServiceInfo {
            id: row.ulid("id")?,
            duration_minutes: row.minutes("duration_minutes")?,
        })),
        "appointments" => Ok(Command::InsertAppointment(AppointmentRequest {
            id: row.opt_ulid("id")?,
            customer_user_id: row.ulid("customer_user_id")?,
            team_member_id: row.ulid("team_member_id")?,
            service_id: row.ulid("service_id")?,
            appointment_date: row.date("appointment_date")?,
            start_time: row.text("start_time")?,
            duration_minutes: row.opt_minutes("duration_minutes")?,
            customer_notes: row.opt_text("customer_notes")?,
        })),
        "status_changes" => {
            let raw = row.text("status")?;
            let status = AppointmentStatus::parse(&raw).ok_or_else(|| SqlError::Invalid {
                column: "status",
                reason: format!("unknown status {raw:?}"),
            })?;
            Ok(Command::ChangeStatus {
                appointment_id: row.ulid("appointment_id")?,
                status,
                reason: row.opt_text("reason")?,
            })
        }
        "reschedules" => Ok(Command::Reschedule {
            appointment_id: row.ulid("appointment_id")?,
            change: ScheduleChange {
                appointment_date: row.opt_date("appointment_date")?,
                start_time: row.opt_text("start_time")?,
                duration_minutes: row.opt_minutes("duration_minutes")?,
            },
        }),
        "appointment_notes" => Ok(Command::SetNotes {
            appointment_id: row.ulid("appointment_id")?,
            notes: row.opt_text("notes")?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = Fields::from_filters(delete.selection.as_ref())?.ulid("id")?;

    match table.as_str() {
        "availability_rules" => Ok(Command::DeleteRule { id }),
        "working_hours" | "special_hours" => Ok(Command::DeleteShopHours { id }),
        "appointments" => Ok(Command::DeleteAppointment { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
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
    let filters = Fields::from_filters(select.selection.as_ref())?;

    match table.as_str() {
        "slots" => Ok(Command::SelectSlots(SlotQuery {
            team_member_id: filters.ulid("team_member_id")?,
            shop_id: filters.ulid("shop_id")?,
            date: filters.date("date")?,
            service_id: filters.ulid("service_id")?,
            step_minutes: filters.opt_minutes("step")?,
        })),
        "availability" => Ok(Command::SelectAvailability(AvailabilityCheck {
            team_member_id: filters.ulid("team_member_id")?,
            date: filters.date("date")?,
            start_time: filters.text("start_time")?,
            duration_minutes: filters.minutes("duration_minutes")?,
        })),
        "appointments" => match filters.opt_ulid("id")? {
            Some(id) => Ok(Command::SelectAppointment { id }),
            None => Ok(Command::SelectDayAppointments {
                team_member_id: filters.ulid("team_member_id")?,
                date: filters.date("date")?,
            }),
        },
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn day_of_week_value(v: i64) -> Result<u8, SqlError> {
    u8::try_from(v).ok().filter(|d| *d < 7).ok_or_else(|| SqlError::Invalid {
        column: "day_of_week",
        reason: format!("{v} is not within 0..=6 (Sunday = 0)"),
    })
}

// ── Column access ─────────────────────────────────────────────

/// Column → literal, from an INSERT row or from `col = value` WHERE filters.
struct Fields {
    values: HashMap<String, Literal>,
    /// Filters report a missing WHERE term; inserts a missing column.
    from_where: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Null,
    Text(String),
    Number(String),
    Bool(bool),
}

impl Fields {
    fn from_insert(insert: &ast::Insert, schema: &'static [&'static str]) -> Result<Self, SqlError> {
        let row = extract_insert_values(insert)?;
        let names: Vec<String> = if insert.columns.is_empty() {
            if row.len() > schema.len() {
                return Err(SqlError::WrongArity(schema.len(), row.len()));
            }
            schema.iter().map(|c| c.to_string()).collect()
        } else {
            if insert.columns.len() != row.len() {
                return Err(SqlError::WrongArity(insert.columns.len(), row.len()));
            }
            insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
        };

        let mut values = HashMap::new();
        for (name, expr) in names.into_iter().zip(row.iter()) {
            if !schema.contains(&name.as_str()) {
                return Err(SqlError::UnknownColumn(name));
            }
            values.insert(name, literal(expr)?);
        }
        Ok(Self {
            values,
            from_where: false,
        })
    }

    fn from_filters(selection: Option<&Expr>) -> Result<Self, SqlError> {
        let mut values = HashMap::new();
        if let Some(expr) = selection {
            collect_equalities(expr, &mut values)?;
        }
        Ok(Self {
            values,
            from_where: true,
        })
    }

    fn missing(&self, column: &'static str) -> SqlError {
        if self.from_where {
            SqlError::MissingFilter(column)
        } else {
            SqlError::MissingColumn(column)
        }
    }

    /// `None` for an absent column or an explicit NULL.
    fn get(&self, column: &str) -> Option<&Literal> {
        self.values.get(column).filter(|v| **v != Literal::Null)
    }

    fn opt_text(&self, column: &'static str) -> Result<Option<String>, SqlError> {
        match self.get(column) {
            None => Ok(None),
            Some(Literal::Text(s) | Literal::Number(s)) => Ok(Some(s.clone())),
            Some(other) => Err(invalid(column, format!("expected text, got {other:?}"))),
        }
    }

    fn text(&self, column: &'static str) -> Result<String, SqlError> {
        self.opt_text(column)?.ok_or_else(|| self.missing(column))
    }

    fn opt_ulid(&self, column: &'static str) -> Result<Option<Ulid>, SqlError> {
        self.opt_text(column)?
            .map(|s| Ulid::from_string(&s).map_err(|e| invalid(column, format!("bad ULID: {e}"))))
            .transpose()
    }

    fn ulid(&self, column: &'static str) -> Result<Ulid, SqlError> {
        self.opt_ulid(column)?.ok_or_else(|| self.missing(column))
    }

    fn opt_date(&self, column: &'static str) -> Result<Option<NaiveDate>, SqlError> {
        self.opt_text(column)?
            .map(|s| {
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map_err(|e| invalid(column, format!("bad date {s:?}: {e}")))
            })
            .transpose()
    }

    fn date(&self, column: &'static str) -> Result<NaiveDate, SqlError> {
        self.opt_date(column)?.ok_or_else(|| self.missing(column))
    }

    fn opt_int(&self, column: &'static str) -> Result<Option<i64>, SqlError> {
        match self.get(column) {
            None => Ok(None),
            Some(Literal::Number(s) | Literal::Text(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| invalid(column, format!("bad integer {s:?}: {e}"))),
            Some(other) => Err(invalid(column, format!("expected integer, got {other:?}"))),
        }
    }

    fn int(&self, column: &'static str) -> Result<i64, SqlError> {
        self.opt_int(column)?.ok_or_else(|| self.missing(column))
    }

    fn opt_minutes(&self, column: &'static str) -> Result<Option<Minutes>, SqlError> {
        self.opt_int(column)?
            .map(|v| Minutes::try_from(v).map_err(|_| invalid(column, format!("{v} out of range"))))
            .transpose()
    }

    fn minutes(&self, column: &'static str) -> Result<Minutes, SqlError> {
        self.opt_minutes(column)?.ok_or_else(|| self.missing(column))
    }

    fn opt_bool(&self, column: &'static str) -> Result<Option<bool>, SqlError> {
        match self.get(column) {
            None => Ok(None),
            Some(Literal::Bool(b)) => Ok(Some(*b)),
            Some(Literal::Text(s) | Literal::Number(s)) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Some(true)),
                "false" | "f" | "0" => Ok(Some(false)),
                _ => Err(invalid(column, format!("bad bool: {s}"))),
            },
            Some(Literal::Null) => Ok(None),
        }
    }

    fn slot_order(&self) -> Result<u32, SqlError> {
        match self.opt_int("slot_order")? {
            None => Ok(0),
            Some(v) => u32::try_from(v).map_err(|_| invalid("slot_order", format!("{v} out of range"))),
        }
    }

    /// `start_time`/`end_time` as a non-empty window.
    fn window(&self) -> Result<Window, SqlError> {
        let start = self.text("start_time")?;
        let end = self.text("end_time")?;
        Ok(Window::parse(&start, &end)?)
    }
}

fn invalid(column: &'static str, reason: String) -> SqlError {
    SqlError::Invalid { column, reason }
}

fn collect_equalities(expr: &Expr, out: &mut HashMap<String, Literal>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_equalities(left, out)?;
            collect_equalities(right, out)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let col = expr_column_name(left).ok_or_else(|| SqlError::Unsupported(format!("filter {expr}")))?;
            out.insert(col, literal(right)?);
            Ok(())
        }
        Expr::Nested(inner) => collect_equalities(inner, out),
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

fn literal(expr: &Expr) -> Result<Literal, SqlError> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => match value {
            Value::Null => Ok(Literal::Null),
            Value::SingleQuotedString(s) => Ok(Literal::Text(s.clone())),
            Value::Number(n, _) => Ok(Literal::Number(n.clone())),
            Value::Boolean(b) => Ok(Literal::Bool(*b)),
            other => Err(SqlError::Parse(format!("unsupported literal {other:?}"))),
        },
        Expr::UnaryOp {
            op: ast::UnaryOperator::Minus,
            expr,
        } => match literal(expr)? {
            Literal::Number(n) => Ok(Literal::Number(format!("-{n}"))),
            other => Err(SqlError::Parse(format!("cannot negate {other:?}"))),
        },
        _ => Err(SqlError::Parse(format!("expected value, got {expr}"))),
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
            [row] => Ok(row.as_slice()),
            [] => Err(SqlError::Parse("empty VALUES".into())),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
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
    #[error("expected {0} values, got {1}")]
    WrongArity(usize, usize),
    #[error("missing value for column: {0}")]
    MissingColumn(&'static str),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    #[error("invalid {column}: {reason}")]
    Invalid { column: &'static str, reason: String },
    #[error(transparent)]
    Time(#[from] TimeError),
}

impl SqlError {
    pub fn sqlstate(&self) -> &'static str {
        match self {
            SqlError::Parse(_) | SqlError::Empty | SqlError::WrongArity(..) => "42601",
            SqlError::Unsupported(_) => "0A000",
            SqlError::UnknownTable(_) => "42P01",
            SqlError::UnknownColumn(_) => "42703",
            SqlError::MissingColumn(_) | SqlError::MissingFilter(_) => "23502",
            SqlError::Invalid { .. } => "22023",
            SqlError::Time(TimeError::InvalidTimeFormat(_)) => "22007",
            SqlError::Time(_) => "22023",
        }
    }
}
