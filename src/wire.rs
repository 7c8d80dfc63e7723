use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::{TlsAcceptor, process_socket};
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth::SlotwiseAuthSource;
use crate::engine::EngineError;
use crate::model::*;
use crate::observability::{QUERIES_TOTAL, QUERY_DURATION_SECONDS, command_label};
use crate::sql::{self, Command, ResultShape, SqlError};
use crate::tenant::{Tenant, TenantManager};

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls_acceptor: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = SlotwiseFactory::new(tenant_manager, password);
    process_socket(socket, tls_acceptor, factory).await
}

pub struct SlotwiseHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<SlotwiseQueryParser>,
}

impl SlotwiseHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(SlotwiseQueryParser),
        }
    }

    /// The connection's database name picks the tenant.
    fn resolve_tenant<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Tenant>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("tenant error: {e}")))
    }

    async fn run(&self, tenant: &Tenant, sql: &str, format: &Format) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(sql).map_err(sql_err)?;
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(tenant, cmd, format).await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label).record(started.elapsed().as_secs_f64());
        result.map_err(engine_err)
    }

    async fn execute_command(&self, tenant: &Tenant, cmd: Command, format: &Format) -> Result<Response, EngineError> {
        let store = &tenant.store;
        let engine = &tenant.engine;
        match cmd {
            Command::InsertRule(rule) => {
                store.put_rule(rule).await?;
                Ok(tag("INSERT", 1))
            }
            Command::DeleteRule { id } => {
                store
                    .remove_rule(id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("availability rule", id))?;
                Ok(tag("DELETE", 1))
            }
            Command::InsertWorkingHours(hours) => {
                store.put_working_hours(hours).await?;
                Ok(tag("INSERT", 1))
            }
            Command::InsertSpecialHours(hours) => {
                store.put_special_hours(hours).await?;
                Ok(tag("INSERT", 1))
            }
            Command::DeleteShopHours { id } => {
                store
                    .remove_shop_hours(id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("shop hours", id))?;
                Ok(tag("DELETE", 1))
            }
            Command::InsertService(service) => {
                store.put_service(service).await?;
                Ok(tag("INSERT", 1))
            }
            Command::InsertAppointment(req) => {
                let appointment = engine.create_appointment(req).await?;
                Ok(appointment_rows(vec![appointment], format))
            }
            Command::ChangeStatus {
                appointment_id,
                status,
                reason,
            } => {
                let appointment = engine.update_status(appointment_id, status, reason).await?;
                Ok(appointment_rows(vec![appointment], format))
            }
            Command::Reschedule { appointment_id, change } => {
                let appointment = engine.update_schedule(appointment_id, change).await?;
                Ok(appointment_rows(vec![appointment], format))
            }
            Command::SetNotes { appointment_id, notes } => {
                let appointment = engine.update_notes(appointment_id, notes).await?;
                Ok(appointment_rows(vec![appointment], format))
            }
            Command::DeleteAppointment { id } => {
                engine.delete_appointment(id).await?;
                Ok(tag("DELETE", 1))
            }
            Command::SelectSlots(query) => {
                let slots = engine.available_slots(query).await?;
                Ok(slot_rows(slots, format))
            }
            Command::SelectAvailability(check) => {
                let available = engine.check_availability(check).await?;
                let schema = Arc::new(availability_schema(format));
                let mut encoder = DataRowEncoder::new(schema.clone());
                let row = encoder.encode_field(&available).map(|_| encoder.take_row());
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(vec![row]))))
            }
            Command::SelectAppointment { id } => {
                let appointment = engine.get_appointment(id).await?;
                Ok(appointment_rows(vec![appointment], format))
            }
            Command::SelectDayAppointments { team_member_id, date } => {
                let appointments = engine.appointments_for_day(team_member_id, date).await?;
                Ok(appointment_rows(appointments, format))
            }
        }
    }
}

fn tag(command: &str, rows: usize) -> Response {
    Response::Execution(Tag::new(command).with_rows(rows))
}

/// Column name and type; the client's requested format is applied per index.
fn fields(columns: &[(&str, Type)], format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, (name, ty))| FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(idx)))
        .collect()
}

fn slots_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("start_time", Type::VARCHAR),
            ("end_time", Type::VARCHAR),
            ("available", Type::BOOL),
        ],
        format,
    )
}

fn availability_schema(format: &Format) -> Vec<FieldInfo> {
    fields(&[("available", Type::BOOL)], format)
}

fn appointment_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("id", Type::VARCHAR),
            ("customer_user_id", Type::VARCHAR),
            ("team_member_id", Type::VARCHAR),
            ("service_id", Type::VARCHAR),
            ("appointment_date", Type::VARCHAR),
            ("start_time", Type::VARCHAR),
            ("end_time", Type::VARCHAR),
            ("duration_minutes", Type::INT4),
            ("status", Type::VARCHAR),
            ("notes", Type::VARCHAR),
            ("customer_notes", Type::VARCHAR),
            ("cancellation_reason", Type::VARCHAR),
            ("created_at", Type::VARCHAR),
            ("updated_at", Type::VARCHAR),
        ],
        format,
    )
}

fn schema_for(sql: &str, format: &Format) -> Vec<FieldInfo> {
    match sql::result_shape(sql) {
        Some(ResultShape::Slots) => slots_schema(format),
        Some(ResultShape::Availability) => availability_schema(format),
        Some(ResultShape::Appointments) => appointment_schema(format),
        None => vec![],
    }
}

fn slot_rows(slots: Vec<TimeSlot>, format: &Format) -> Response {
    let schema = Arc::new(slots_schema(format));
    let rows: Vec<PgWireResult<_>> = slots
        .into_iter()
        .map(|slot| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&crate::time::format_lossy(slot.start_time))?;
            encoder.encode_field(&crate::time::format_lossy(slot.end_time))?;
            encoder.encode_field(&slot.available)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn appointment_rows(appointments: Vec<Appointment>, format: &Format) -> Response {
    let schema = Arc::new(appointment_schema(format));
    let rows: Vec<PgWireResult<_>> = appointments
        .into_iter()
        .map(|a| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&a.id.to_string())?;
            encoder.encode_field(&a.customer_user_id.to_string())?;
            encoder.encode_field(&a.team_member_id.to_string())?;
            encoder.encode_field(&a.service_id.to_string())?;
            encoder.encode_field(&a.appointment_date.format("%Y-%m-%d").to_string())?;
            encoder.encode_field(&crate::time::format_lossy(a.start_time))?;
            encoder.encode_field(&crate::time::format_lossy(a.end_time))?;
            encoder.encode_field(&a.duration_minutes)?;
            encoder.encode_field(&a.status.to_string())?;
            encoder.encode_field(&a.notes)?;
            encoder.encode_field(&a.customer_notes)?;
            encoder.encode_field(&a.cancellation_reason)?;
            encoder.encode_field(&a.created_at.to_rfc3339())?;
            encoder.encode_field(&a.updated_at.to_rfc3339())?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

#[async_trait]
impl SimpleQueryHandler for SlotwiseHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let tenant = self.resolve_tenant(client)?;
        debug!("simple query: {query}");
        Ok(vec![self.run(&tenant, query, &Format::UnifiedText).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SlotwiseQueryParser;

#[async_trait]
impl QueryParser for SlotwiseQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        let text = Format::UnifiedText;
        Ok(schema_for(stmt, column_format.unwrap_or(&text)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for SlotwiseHandler {
    type Statement = String;
    type QueryParser = SlotwiseQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(&self, client: &mut C, portal: &Portal<Self::Statement>, _max_rows: usize) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let tenant = self.resolve_tenant(client)?;
        let sql = substitute_params(portal);
        self.run(&tenant, &sql, &portal.result_column_format).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema_for(&target.statement, &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Replace `$1, $2, ...` with the bound text-format values, quoted.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut result = portal.statement.statement.to_string();

    // Highest index first so `$1` never clobbers the prefix of `$10`.
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct SlotwiseFactory {
    handler: Arc<SlotwiseHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<SlotwiseAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl SlotwiseFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = SlotwiseAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(SlotwiseHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(auth_source, param_provider)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SlotwiseFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

/// The message leads with the stable kind, e.g. `SLOT_CONFLICT: ...`.
fn engine_err(e: EngineError) -> PgWireError {
    user_error(e.sqlstate(), format!("{}: {e}", e.kind()))
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error(e.sqlstate(), e.to_string())
}
