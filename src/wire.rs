use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{AuthSource, DefaultServerParameterProvider, LoginInfo, Password, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use ulid::Ulid;

use crate::engine::{Availability, Engine, EngineError};
use crate::model::*;
use crate::observability::{self, command_label};
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(BookdFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

pub struct BookdHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<BookdQueryParser>,
}

impl BookdHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(BookdQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("tenant error: {e}")))
    }

    /// Parse, execute and record one statement.
    async fn run(&self, engine: &Arc<Engine>, query: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd).await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, engine: &Arc<Engine>, cmd: Command) -> PgWireResult<Response> {
        match cmd {
            Command::RegisterService {
                id,
                name,
                duration_minutes,
                price_cents,
            } => {
                engine
                    .register_service(id, name, duration_minutes, price_cents)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateService { id, update } => {
                engine.update_service(id, update).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeactivateService { id } => {
                engine.deactivate_service(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::ListServices => service_rows(engine.list_services()),
            Command::CreateAppointment(req) => {
                engine.create_appointment(req).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::RescheduleAppointment { id, start } => {
                engine
                    .reschedule_appointment(id, start)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::TransitionAppointment { id, transition } => {
                let result = match transition {
                    Transition::Confirm => engine.confirm_appointment(id).await,
                    Transition::Cancel => engine.cancel_appointment(id).await,
                    Transition::Complete => engine.complete_appointment(id).await,
                    Transition::Reschedule => {
                        return Err(sql_err(SqlError::Unsupported(
                            "reschedule needs a new start".into(),
                        )));
                    }
                };
                result.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::GetAppointment { id } => match engine.get_appointment(id).await {
                Ok(a) => appointment_rows(vec![a]),
                Err(EngineError::AppointmentNotFound(_)) => appointment_rows(vec![]),
                Err(e) => Err(engine_err(e)),
            },
            Command::ListAppointments {
                resource_id,
                start,
                end,
                status,
            } => {
                let window = Span::try_new(start, end).map_err(engine_err)?;
                let mut appointments = engine
                    .list_appointments(resource_id, window)
                    .await
                    .map_err(engine_err)?;
                if let Some(status) = status {
                    appointments.retain(|a| a.status == status);
                }
                appointment_rows(appointments)
            }
            Command::FreeSlots {
                resource_id,
                service_id,
                start,
                end,
            } => {
                let window = Span::try_new(start, end).map_err(engine_err)?;
                let slots = engine
                    .find_free_slots(resource_id, service_id, window)
                    .await
                    .map_err(engine_err)?;
                availability_rows(resource_id, slots)
            }
            Command::CheckSlot {
                resource_id,
                service_id,
                start,
            } => {
                let verdict = engine
                    .check_slot(resource_id, service_id, start)
                    .await
                    .map_err(engine_err)?;
                let conflicts = match verdict {
                    Availability::Available => vec![],
                    Availability::Conflicting(a) => vec![a],
                };
                conflict_rows(conflicts)
            }
        }
    }
}

// ── Result schemas ───────────────────────────────────────────────

fn text_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn appointment_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("resource_id", Type::VARCHAR),
        text_field("service_id", Type::VARCHAR),
        text_field("customer_id", Type::VARCHAR),
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
        text_field("status", Type::VARCHAR),
    ]
}

fn service_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("name", Type::VARCHAR),
        text_field("duration_minutes", Type::INT8),
        text_field("price_cents", Type::INT8),
        text_field("active", Type::BOOL),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text_field("resource_id", Type::VARCHAR),
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
    ]
}

fn conflict_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("resource_id", Type::VARCHAR),
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
        text_field("status", Type::VARCHAR),
    ]
}

/// Schema a SELECT will produce, chosen from the table it reads.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let normalized = sql
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if !normalized.trim_start().starts_with("select") {
        return vec![];
    }
    let table = normalized
        .split(" from ")
        .nth(1)
        .and_then(|rest| rest.split([' ', ';']).next())
        .unwrap_or("");
    match table {
        "appointments" => appointment_schema(),
        "services" => service_schema(),
        "availability" => availability_schema(),
        "conflicts" => conflict_schema(),
        _ => vec![],
    }
}

fn appointment_rows(appointments: Vec<Appointment>) -> PgWireResult<Response> {
    let schema = Arc::new(appointment_schema());
    let rows: Vec<PgWireResult<_>> = appointments
        .into_iter()
        .map(|a| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&a.id.to_string())?;
            encoder.encode_field(&a.resource_id.to_string())?;
            encoder.encode_field(&a.service_id.to_string())?;
            encoder.encode_field(&a.customer_id.to_string())?;
            encoder.encode_field(&a.span.start)?;
            encoder.encode_field(&a.span.end)?;
            encoder.encode_field(&a.status.to_string())?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn service_rows(services: Vec<Service>) -> PgWireResult<Response> {
    let schema = Arc::new(service_schema());
    let rows: Vec<PgWireResult<_>> = services
        .into_iter()
        .map(|s| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&s.id.to_string())?;
            encoder.encode_field(&s.name)?;
            encoder.encode_field(&i64::from(s.duration_minutes))?;
            encoder.encode_field(&i64::try_from(s.price_cents).unwrap_or(i64::MAX))?;
            encoder.encode_field(&s.active)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn availability_rows(resource_id: Ulid, slots: Vec<Span>) -> PgWireResult<Response> {
    let schema = Arc::new(availability_schema());
    let rid_str = resource_id.to_string();
    let rows: Vec<PgWireResult<_>> = slots
        .into_iter()
        .map(|slot| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&rid_str)?;
            encoder.encode_field(&slot.start)?;
            encoder.encode_field(&slot.end)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn conflict_rows(conflicts: Vec<Appointment>) -> PgWireResult<Response> {
    let schema = Arc::new(conflict_schema());
    let rows: Vec<PgWireResult<_>> = conflicts
        .into_iter()
        .map(|a| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&a.id.to_string())?;
            encoder.encode_field(&a.resource_id.to_string())?;
            encoder.encode_field(&a.span.start)?;
            encoder.encode_field(&a.span.end)?;
            encoder.encode_field(&a.status.to_string())?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

#[async_trait]
impl SimpleQueryHandler for BookdHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        Ok(vec![self.run(&engine, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct BookdQueryParser;

#[async_trait]
impl QueryParser for BookdQueryParser {
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

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for BookdHandler {
    type Statement = String;
    type QueryParser = BookdQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        self.run(&engine, &sql).await
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
            result_schema(&target.statement),
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
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Substitute `$1, $2, ...` with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    bind_params(&portal.statement.statement, &portal.parameters)
}

/// One left-to-right pass over the statement. Placeholders inside quoted
/// literals or identifiers stay as written, and substituted values are
/// never rescanned.
fn bind_params<P: AsRef<[u8]>>(sql: &str, params: &[Option<P>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '$') => {
                let digits_start = i + 1;
                let mut digits_end = digits_start;
                while let Some(&(j, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits_end = j + 1;
                    chars.next();
                }
                let bound = sql[digits_start..digits_end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| params.get(idx));
                match bound {
                    Some(Some(bytes)) => {
                        let text = String::from_utf8_lossy(bytes.as_ref());
                        out.push('\'');
                        out.push_str(&text.replace('\'', "''"));
                        out.push('\'');
                    }
                    Some(None) => out.push_str("NULL"),
                    None => out.push_str(&sql[i..digits_end]),
                }
                continue;
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

// ── Auth ─────────────────────────────────────────────────────────

/// Single shared password for every tenant.
#[derive(Debug)]
pub struct BookdAuthSource {
    password: String,
}

impl BookdAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for BookdAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

// ── Factory ──────────────────────────────────────────────────────

pub struct BookdFactory {
    handler: Arc<BookdHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<BookdAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl BookdFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        Self {
            handler: Arc::new(BookdHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                BookdAuthSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for BookdFactory {
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

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

/// SQLSTATE for each engine failure. Clients retry on 40001.
fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::SlotConflict { .. } => "23P01",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::InvalidTransition { .. } => "55000",
        EngineError::AppointmentNotFound(_) | EngineError::ServiceNotFound(_) => "P0002",
        EngineError::ServiceInactive(_) | EngineError::InvalidService(_) => "22023",
        EngineError::InvalidInterval { .. } => "22007",
        EngineError::ConcurrencyFailure(_) => "40001",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
        EngineError::Aborted(_) => "XX000",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    match &e {
        EngineError::WalError(_) | EngineError::Aborted(_) => tracing::error!("engine failure: {e}"),
        _ => tracing::debug!("rejected: {e}"),
    }
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}
