use std::fmt::Debug;
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
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use tokio::net::TcpStream;

use crate::auth::BaybookAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{self, command_label};
use crate::sql::{self, Command, SqlError};

pub struct BaybookHandler {
    engine: Arc<Engine>,
    query_parser: Arc<BaybookQueryParser>,
}

impl BaybookHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(BaybookQueryParser),
        }
    }

    /// Parse and run one statement, recording query metrics.
    async fn run(&self, query: &str) -> PgWireResult<Vec<Response>> {
        let cmd = sql::parse_sql(query).map_err(|e| {
            metrics::counter!(observability::QUERIES_TOTAL, "command" => "unparsed", "status" => "error")
                .increment(1);
            sql_err(e)
        })?;
        let label = command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::SelectServices => {
                let schema = Arc::new(services_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .services()
                    .await
                    .into_iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&s.id)?;
                        encoder.encode_field(&s.name)?;
                        encoder.encode_field(&(s.duration_minutes as i64))?;
                        encoder.encode_field(&s.price.to_string())?;
                        encoder.encode_field(&s.description)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::InsertService(service) => {
                engine.add_service(service).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateServicePrice { id, price } => {
                let found = engine.update_service_price(&id, price).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(found as usize))])
            }
            Command::DeleteService { id } => {
                let removed = engine.remove_service(&id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(removed as usize))])
            }
            Command::SelectSlots { date } => {
                let answer = engine.slots(&date).await.map_err(engine_err)?;
                let schema = Arc::new(slots_schema());
                let kind = answer.kind.as_str().to_string();
                let rows: Vec<PgWireResult<_>> = answer
                    .slots
                    .iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&kind)?;
                        encoder.encode_field(&slot.format(TIME_FORMAT).to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::InsertReservation(req) => {
                engine.submit_booking(req).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::InsertManualReservation(manual) => {
                engine.add_manual_reservation(manual).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateReservationStatus { id, action } => {
                let updated = match engine.set_status(&id, action).await {
                    Ok(_) => 1,
                    Err(EngineError::NotFound(_)) => 0,
                    Err(e) => return Err(engine_err(e)),
                };
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(updated))])
            }
            Command::SelectReservations => {
                let active = engine.active_reservations().await.map_err(engine_err)?;
                Ok(vec![text_rows(
                    reservations_schema(),
                    active.iter().map(Reservation::to_fields),
                )])
            }
            Command::SelectArchive => {
                let archived = engine.archived_reservations().await.map_err(engine_err)?;
                Ok(vec![text_rows(
                    archive_schema(),
                    archived.iter().map(ArchivedReservation::to_fields),
                )])
            }
            Command::SelectDashboard => {
                let dashboard = engine.dashboard().await.map_err(engine_err)?;
                let schema = Arc::new(dashboard_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&(dashboard.pending_count as i64))?;
                encoder.encode_field(&(dashboard.total_count as i64))?;
                encoder.encode_field(
                    &dashboard
                        .latest_created_at
                        .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
                )?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
        }
    }
}

/// A query response whose columns are all text.
fn text_rows(fields: Vec<FieldInfo>, rows: impl Iterator<Item = Vec<String>>) -> Response {
    let schema = Arc::new(fields);
    let rows: Vec<PgWireResult<_>> = rows
        .map(|values| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            for value in &values {
                encoder.encode_field(value)?;
            }
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

// ── Result schemas ───────────────────────────────────────────────

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn services_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("name"),
        int_field("duration"),
        text_field("price"),
        text_field("description"),
    ]
}

fn slots_schema() -> Vec<FieldInfo> {
    vec![text_field("kind"), text_field("slot")]
}

fn reservations_schema() -> Vec<FieldInfo> {
    RESERVATION_FIELDS.iter().map(|f| text_field(f)).collect()
}

fn archive_schema() -> Vec<FieldInfo> {
    RESERVATION_FIELDS
        .iter()
        .chain(ARCHIVE_FIELDS.iter())
        .map(|f| text_field(f))
        .collect()
}

fn dashboard_schema() -> Vec<FieldInfo> {
    vec![
        int_field("pending_count"),
        int_field("total_count"),
        text_field("latest_created_at"),
    ]
}

/// Result columns of a statement, judged from its `FROM` table. Only SELECTs
/// return rows.
fn describe_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    if !lower.trim_start().starts_with("select") {
        return vec![];
    }
    let table = lower
        .split_whitespace()
        .skip_while(|w| *w != "from")
        .nth(1)
        .map(|t| t.trim_end_matches(';'));
    match table {
        Some("services") => services_schema(),
        Some("slots") => slots_schema(),
        Some("reservations") => reservations_schema(),
        Some("archive") => archive_schema(),
        Some("dashboard") => dashboard_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for BaybookHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(query).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct BaybookQueryParser;

#[async_trait]
impl QueryParser for BaybookQueryParser {
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

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(describe_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for BaybookHandler {
    type Statement = String;
    type QueryParser = BaybookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let mut responses = self.run(&sql).await?;
        if responses.is_empty() {
            return Ok(Response::EmptyQuery);
        }
        Ok(responses.remove(0))
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
            describe_schema(&target.statement),
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
        Ok(DescribePortalResponse::new(describe_schema(&target.statement.statement)))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
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

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
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

pub struct BaybookFactory {
    handler: Arc<BaybookHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<BaybookAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl BaybookFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = BaybookAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(BaybookHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for BaybookFactory {
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

/// Serve one client connection until it closes.
pub async fn process_connection(socket: TcpStream, factory: Arc<BaybookFactory>) -> std::io::Result<()> {
    pgwire::tokio::process_socket(socket, None, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.sqlstate().into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_follows_from_table() {
        assert_eq!(describe_schema("SELECT * FROM services").len(), 5);
        assert_eq!(describe_schema("select * from slots where date = $1").len(), 2);
        assert_eq!(describe_schema("SELECT * FROM reservations;").len(), 13);
        assert_eq!(describe_schema("SELECT * FROM archive").len(), 15);
        assert_eq!(describe_schema("SELECT * FROM dashboard").len(), 3);
        assert!(describe_schema("UPDATE reservations SET status = $1 WHERE id = $2").is_empty());
    }

    #[test]
    fn counts_highest_placeholder() {
        assert_eq!(count_params("SELECT * FROM services"), 0);
        assert_eq!(count_params("UPDATE reservations SET status = $2 WHERE id = $1"), 2);
        assert_eq!(count_params("INSERT INTO reservations VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)"), 10);
    }
}
