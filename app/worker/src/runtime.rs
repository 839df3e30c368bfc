//! The worker message loop and query execution.

use std::time::Duration;
use std::time::Instant;

use bson::Bson;
use bson::Document;
use bson::doc;
use futures::TryStreamExt;
use mongodb::Client;
use mongodb::Database;
use mongodb::options::ClientOptions;
use mongodb::options::ReadConcern;
use mongodb::options::ReadPreference;
use mongodb::options::SelectionCriteria;
use mongodb::options::WriteConcern;
use serde_json::Value;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncWrite;

use crate::error::Result;
use crate::error::WorkerError;
use tally_protocol::Message;
use tally_protocol::ProtocolError;
use tally_protocol::QueryMetrics;
use tally_protocol::QueryRequest;
use tally_protocol::QueryResult;
use tally_protocol::WireError;
use tally_protocol::bson_to_wire;
use tally_protocol::read_message;
use tally_protocol::wire_to_document;
use tally_protocol::write_message;

/// Default connect/server-selection timeout.
const DEFAULT_CONNECT_TIMEOUT_MS: i64 = 10_000;

/// Recognized keys of the `databaseOptions` object.
#[derive(Debug, Clone)]
struct WorkerOptions {
    app_name: Option<String>,
    connect_timeout_ms: i64,
    debug: bool,
}

impl WorkerOptions {
    fn from_value(value: &Value) -> Self {
        Self {
            app_name: value
                .get("appName")
                .and_then(Value::as_str)
                .map(str::to_string),
            connect_timeout_ms: value
                .get("connectTimeoutMS")
                .and_then(Value::as_i64)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            debug: value
                .get("debug")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// Worker state: the database client once `INIT` succeeds.
struct WorkerRuntime {
    database: Option<Database>,
    client: Option<Client>,
    debug: bool,
}

/// Drive the worker message loop until `SHUTDOWN` or end of stream.
///
/// Returns an error — and the process exits non-zero — when
/// initialization fails or the channel to the parent breaks.
pub async fn run<R, W>(mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut runtime = WorkerRuntime {
        database: None,
        client: None,
        debug: false,
    };

    loop {
        let message = match read_message(&mut reader).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::info!("Channel closed; worker exiting");
                return Ok(());
            }
            Err(ProtocolError::InvalidMessage { cause }) => {
                tracing::warn!(cause = cause.as_str(), "Skipping undecodable message");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match message {
            Message::Init {
                connection_string,
                database_name,
                database_options,
            } => match runtime
                .initialize(&connection_string, &database_name, &database_options)
                .await
            {
                Ok(()) => {
                    tracing::info!(database = database_name.as_str(), "Worker initialized");
                    write_message(&mut writer, &Message::Ready).await?;
                }
                Err(cause) => {
                    tracing::error!(cause = cause.as_str(), "Initialization failed");
                    write_message(&mut writer, &Message::Error {
                        message: cause.clone(),
                    })
                    .await?;
                    return Err(WorkerError::Init { cause });
                }
            },
            Message::Query(request) => {
                let result = runtime.execute(request).await;
                write_message(&mut writer, &Message::Result(result)).await?;
            }
            Message::QueryBatch { batch_id, requests } => {
                let mut results = Vec::with_capacity(requests.len());
                for request in requests {
                    results.push(runtime.execute(request).await);
                }
                write_message(&mut writer, &Message::ResultBatch { batch_id, results }).await?;
            }
            Message::Shutdown => {
                tracing::info!("Shutdown requested");
                runtime.close().await;
                return Ok(());
            }
            other => {
                tracing::warn!("Unexpected message: {other:?}");
            }
        }
    }
}

impl WorkerRuntime {
    /// Open the database client and verify the server is reachable.
    async fn initialize(
        &mut self,
        connection_string: &str,
        database_name: &str,
        database_options: &Value,
    ) -> std::result::Result<(), String> {
        let options = WorkerOptions::from_value(database_options);
        self.debug = options.debug;

        let mut client_options = ClientOptions::parse(connection_string)
            .await
            .map_err(|e| format!("invalid connection string: {e}"))?;
        client_options.app_name = options.app_name.or_else(|| Some("tally-worker".to_string()));
        let connect_timeout = Duration::from_millis(options.connect_timeout_ms.max(1) as u64);
        client_options.connect_timeout = Some(connect_timeout);
        client_options.server_selection_timeout = Some(connect_timeout);
        // Aggregations and lookups read from secondaries when possible;
        // writes elsewhere in the system use majority acknowledgement.
        client_options.read_concern = Some(ReadConcern::local());
        client_options.selection_criteria = Some(SelectionCriteria::ReadPreference(
            ReadPreference::SecondaryPreferred {
                options: Default::default(),
            },
        ));
        let mut write_concern = WriteConcern::majority();
        write_concern.journal = Some(false);
        client_options.write_concern = Some(write_concern);

        let client =
            Client::with_options(client_options).map_err(|e| format!("client setup: {e}"))?;
        let database = client.database(database_name);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| format!("cannot reach database: {e}"))?;

        self.database = Some(database);
        self.client = Some(client);
        Ok(())
    }

    /// Run one aggregation and shape the wire result.
    async fn execute(&self, request: QueryRequest) -> QueryResult {
        let started = Instant::now();
        let Some(database) = &self.database else {
            return failed(
                request.id,
                "StateError",
                "worker received a query before INIT",
            );
        };

        let mut pipeline = Vec::with_capacity(request.query.len());
        for (index, stage) in request.query.iter().enumerate() {
            match wire_to_document(stage, index) {
                Ok(document) => pipeline.push(document),
                Err(e) => return failed(request.id, "QueryShapeError", &e.to_string()),
            }
        }
        let query_size = self
            .debug
            .then(|| serialized_size(&Value::Array(request.query.clone())));

        let collection = database.collection::<Document>(&request.collection_name);
        let mut action = collection.aggregate(pipeline);
        if let Some(allow) = request.options.get("allowDiskUse").and_then(Value::as_bool) {
            action = action.allow_disk_use(allow);
        }

        let mut cursor = match action.await {
            Ok(cursor) => cursor,
            Err(e) => return mongo_failed(request.id, &e),
        };
        let mut documents: Vec<Value> = Vec::new();
        loop {
            match cursor.try_next().await {
                Ok(Some(document)) => {
                    documents.push(bson_to_wire(&Bson::Document(document)));
                }
                Ok(None) => break,
                Err(e) => return mongo_failed(request.id, &e),
            }
        }

        let result_size = self
            .debug
            .then(|| serialized_size(&Value::Array(documents.clone())));
        let query_time = started.elapsed().as_secs_f64() * 1_000.0;
        tracing::debug!(
            id = request.id.as_str(),
            collection = request.collection_name.as_str(),
            documents = documents.len(),
            query_time_ms = query_time,
            "Query done"
        );
        QueryResult {
            id: request.id,
            result: Some(documents),
            error: None,
            metrics: QueryMetrics {
                query_time,
                query_size,
                result_size,
            },
        }
    }

    async fn close(&mut self) {
        self.database = None;
        if let Some(client) = self.client.take() {
            client.shutdown().await;
        }
    }
}

fn failed(id: String, name: &str, message: &str) -> QueryResult {
    QueryResult {
        id,
        result: None,
        error: Some(WireError::new(name, message)),
        metrics: QueryMetrics::default(),
    }
}

fn mongo_failed(id: String, error: &mongodb::error::Error) -> QueryResult {
    failed(id, "MongoError", &error.to_string())
}

fn serialized_size(value: &Value) -> i64 {
    serde_json::to_string(value)
        .map(|text| text.len() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "runtime.test.rs"]
mod tests;
