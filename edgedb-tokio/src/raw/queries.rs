use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use edgedb_errors::{CardinalityViolationError, Error, ErrorKind, InterfaceError};
use edgedb_errors::{InvalidArgumentError, ProtocolEncodingError, ProtocolOutOfOrderError};
use edgedb_protocol::client_message::{ClientMessage, DescribeStatement, Execute};
use edgedb_protocol::client_message::{ExecuteScript, OptimisticExecute, Prepare};
use edgedb_protocol::codec::{Codec, CodecCache};
use edgedb_protocol::common::{Cardinality, IoFormat};
use edgedb_protocol::encoding::KeyValues;
use edgedb_protocol::server_message::{CommandDataDescription, ServerMessage, TransactionState};
use edgedb_protocol::value::Value;

use crate::cache::{PreparedQuery, QueryKey};
use crate::raw::{Connection, Mode, Response};

/// Outcome of a transaction-control statement: either the script ran, or
/// the current transaction state made it a no-op.
#[derive(Debug)]
pub enum TransactionResult {
    Complete(Response),
    Skipped(TransactionState),
}

impl Connection {
    /// Prepares a statement, reusing the shared query cache, and resolves
    /// its input/output codecs, asking the server to describe them when
    /// they are not yet cached.
    pub async fn prepare(
        &mut self,
        io_format: IoFormat,
        cardinality: Cardinality,
        statement: &str,
    ) -> Result<Arc<PreparedQuery>, Error> {
        let key = QueryKey {
            statement: statement.into(),
            cardinality,
            io_format,
        };
        if let Some(prepared) = self.query_cache.get(&key) {
            return Ok(prepared);
        }

        let guard = self.begin_request()?;
        self.send_messages(&[
            ClientMessage::Prepare(Prepare::new(io_format, cardinality, statement)),
            ClientMessage::Flush,
        ])
        .await?;

        let prepared = loop {
            let msg = self.message().await?;
            match msg {
                ServerMessage::PrepareComplete(complete) => {
                    self.check_cardinality(cardinality, complete.cardinality)?;
                    let input_codec = self.codec_cache.get(&complete.input_typedesc_id);
                    let output_codec = self.codec_cache.get(&complete.output_typedesc_id);
                    match (input_codec, output_codec) {
                        (Some(input_codec), Some(output_codec)) => {
                            break PreparedQuery {
                                cardinality: complete.cardinality,
                                input_typedesc_id: complete.input_typedesc_id,
                                output_typedesc_id: complete.output_typedesc_id,
                                input_codec,
                                output_codec,
                            };
                        }
                        // Some referenced type is unknown; have the server
                        // spell the descriptors out.
                        _ => {
                            self.send_messages(&[
                                ClientMessage::DescribeStatement(
                                    DescribeStatement::data_description(),
                                ),
                                ClientMessage::Flush,
                            ])
                            .await?;
                        }
                    }
                }
                ServerMessage::CommandDataDescription(description) => {
                    self.check_cardinality(cardinality, description.result_cardinality)?;
                    break self.materialize(&description)?;
                }
                ServerMessage::ErrorResponse(err) => {
                    // no Sync was sent, so the server will not come back
                    // with ReadyForCommand on its own
                    self.mode = Mode::Dirty;
                    return Err(err.into());
                }
                msg => {
                    self.mode = Mode::Dirty;
                    return Err(ProtocolOutOfOrderError::with_message(format!(
                        "unsolicited message {msg:?}"
                    )));
                }
            }
        };
        let prepared = Arc::new(prepared);
        self.query_cache.add(key, prepared.clone());
        self.end_request(guard);
        Ok(prepared)
    }

    /// Builds both codec trees from a data description, populating the
    /// shared codec cache. A malformed or unknown descriptor is a protocol
    /// defect and poisons the connection.
    fn materialize(
        &mut self,
        description: &CommandDataDescription,
    ) -> Result<PreparedQuery, Error> {
        match build_prepared(&self.codec_cache, description) {
            Ok(prepared) => Ok(prepared),
            Err(e) => {
                self.mode = Mode::Dirty;
                Err(e)
            }
        }
    }

    fn check_cardinality(
        &mut self,
        expected: Cardinality,
        actual: Cardinality,
    ) -> Result<(), Error> {
        if expected == Cardinality::One && actual == Cardinality::NoResult {
            self.mode = Mode::Dirty;
            return Err(CardinalityViolationError::with_message(
                "the statement declared to return one row returns no result",
            ));
        }
        Ok(())
    }

    /// Runs a previously prepared statement. Argument encoding happens
    /// before any traffic; an out-of-domain value fails without touching
    /// the socket.
    pub async fn execute(
        &mut self,
        prepared: &PreparedQuery,
        arguments: &Value,
    ) -> Result<Response, Error> {
        let argument_bytes = encode_arguments(&prepared.input_codec, arguments)?;
        let guard = self.begin_request()?;
        self.send_messages(&[
            ClientMessage::Execute(Execute {
                headers: KeyValues::new(),
                statement_name: Bytes::from(""),
                arguments: argument_bytes,
            }),
            ClientMessage::Sync,
        ])
        .await?;

        let mut data = Vec::new();
        loop {
            let msg = self.message().await?;
            match msg {
                ServerMessage::Data(chunk) => {
                    data.extend(chunk.data);
                }
                ServerMessage::CommandComplete(complete) => {
                    self.expect_ready(guard).await?;
                    return Ok(Response {
                        status_data: complete.status_data,
                        cardinality: Some(prepared.cardinality),
                        data,
                        output_codec: Some(prepared.output_codec.clone()),
                    });
                }
                ServerMessage::ErrorResponse(err) => {
                    self.expect_ready_or_eos(guard)
                        .await
                        .map_err(|e| log::warn!("error waiting for ready after error: {e:#}"))
                        .ok();
                    return Err(err.into());
                }
                msg => {
                    self.mode = Mode::Dirty;
                    return Err(ProtocolOutOfOrderError::with_message(format!(
                        "unsolicited message {msg:?}"
                    )));
                }
            }
        }
    }

    /// The combined prepare-and-execute fast path used when the cache still
    /// holds codecs for this statement. When the server reports changed
    /// descriptors, codecs are re-materialised, the arguments re-encoded
    /// and the command retried as a plain execute (never a second
    /// optimistic pass).
    pub async fn optimistic_execute(
        &mut self,
        key: &QueryKey,
        prepared: &PreparedQuery,
        arguments: &Value,
    ) -> Result<Response, Error> {
        let argument_bytes = encode_arguments(&prepared.input_codec, arguments)?;
        let guard = self.begin_request()?;
        self.send_messages(&[
            ClientMessage::OptimisticExecute(OptimisticExecute {
                headers: KeyValues::new(),
                io_format: key.io_format,
                expected_cardinality: key.cardinality,
                command_text: key.statement.clone(),
                input_typedesc_id: prepared.input_typedesc_id,
                output_typedesc_id: prepared.output_typedesc_id,
                arguments: argument_bytes,
            }),
            ClientMessage::Sync,
        ])
        .await?;

        let mut data = Vec::new();
        let mut changed: Option<CommandDataDescription> = None;
        loop {
            let msg = self.message().await?;
            match msg {
                ServerMessage::Data(chunk) => {
                    data.extend(chunk.data);
                }
                ServerMessage::CommandDataDescription(description) => {
                    changed = Some(description);
                }
                ServerMessage::CommandComplete(complete) => {
                    self.expect_ready(guard).await?;
                    return Ok(Response {
                        status_data: complete.status_data,
                        cardinality: Some(prepared.cardinality),
                        data,
                        output_codec: Some(prepared.output_codec.clone()),
                    });
                }
                ServerMessage::ReadyForCommand(ready) => {
                    self.transaction_state = ready.transaction_state;
                    self.end_request(guard);
                    let Some(description) = changed.take() else {
                        self.mode = Mode::Dirty;
                        return Err(ProtocolOutOfOrderError::with_message(
                            "ready without a completed command",
                        ));
                    };
                    return self.refresh_and_execute(key, description, arguments).await;
                }
                ServerMessage::ErrorResponse(err) => {
                    self.expect_ready_or_eos(guard)
                        .await
                        .map_err(|e| log::warn!("error waiting for ready after error: {e:#}"))
                        .ok();
                    if let Some(description) = changed.take() {
                        return self.refresh_and_execute(key, description, arguments).await;
                    }
                    // the compiled statement on the server is gone
                    self.query_cache.clear(key);
                    return Err(err.into());
                }
                msg => {
                    self.mode = Mode::Dirty;
                    return Err(ProtocolOutOfOrderError::with_message(format!(
                        "unsolicited message {msg:?}"
                    )));
                }
            }
        }
    }

    async fn refresh_and_execute(
        &mut self,
        key: &QueryKey,
        description: CommandDataDescription,
        arguments: &Value,
    ) -> Result<Response, Error> {
        let refreshed = Arc::new(self.materialize(&description)?);
        self.query_cache.add(key.clone(), refreshed.clone());
        self.execute(&refreshed, arguments).await
    }

    /// Prepares the statement if needed and executes it; a still-valid
    /// cache entry takes the single-round-trip optimistic path.
    pub async fn query(
        &mut self,
        io_format: IoFormat,
        cardinality: Cardinality,
        statement: &str,
        arguments: &Value,
    ) -> Result<Response, Error> {
        let key = QueryKey {
            statement: statement.into(),
            cardinality,
            io_format,
        };
        if let Some(prepared) = self.query_cache.get(&key) {
            self.optimistic_execute(&key, &prepared, arguments).await
        } else {
            let prepared = self.prepare(io_format, cardinality, statement).await?;
            self.execute(&prepared, arguments).await
        }
    }

    /// Runs an opaque script. The statement text comes from the caller (the
    /// query-builder collaborator); this driver does not inspect it.
    pub async fn execute_script(
        &mut self,
        script: &str,
        headers: KeyValues,
    ) -> Result<Response, Error> {
        let guard = self.begin_request()?;
        self.send_messages(&[ClientMessage::ExecuteScript(ExecuteScript {
            headers,
            script_text: script.into(),
        })])
        .await?;

        let mut data = Vec::new();
        loop {
            let msg = self.message().await?;
            match msg {
                ServerMessage::Data(chunk) => {
                    data.extend(chunk.data);
                }
                ServerMessage::CommandComplete(complete) => {
                    self.expect_ready(guard).await?;
                    return Ok(Response {
                        status_data: complete.status_data,
                        cardinality: None,
                        data,
                        output_codec: None,
                    });
                }
                ServerMessage::ErrorResponse(err) => {
                    // scripts are followed by ReadyForCommand even on error
                    self.expect_ready_or_eos(guard)
                        .await
                        .map_err(|e| log::warn!("error waiting for ready after error: {e:#}"))
                        .ok();
                    return Err(err.into());
                }
                msg => {
                    self.mode = Mode::Dirty;
                    return Err(ProtocolOutOfOrderError::with_message(format!(
                        "unsolicited message {msg:?}"
                    )));
                }
            }
        }
    }

    /// Starts a transaction; a no-op when one is already open or failed.
    pub async fn begin(&mut self, statement: &str) -> Result<TransactionResult, Error> {
        match self.transaction_state {
            TransactionState::InTransaction | TransactionState::InFailedTransaction => {
                Ok(TransactionResult::Skipped(self.transaction_state))
            }
            TransactionState::NotInTransaction => self
                .execute_script(statement, KeyValues::new())
                .await
                .map(TransactionResult::Complete),
        }
    }

    /// Commits; a no-op outside a healthy transaction. In a failed
    /// transaction the skip reports the failed state back to the caller.
    pub async fn commit(&mut self, statement: &str) -> Result<TransactionResult, Error> {
        match self.transaction_state {
            TransactionState::NotInTransaction | TransactionState::InFailedTransaction => {
                Ok(TransactionResult::Skipped(self.transaction_state))
            }
            TransactionState::InTransaction => self
                .execute_script(statement, KeyValues::new())
                .await
                .map(TransactionResult::Complete),
        }
    }

    /// Rolls back; a no-op when no transaction is open.
    pub async fn rollback(&mut self, statement: &str) -> Result<TransactionResult, Error> {
        match self.transaction_state {
            TransactionState::NotInTransaction => {
                Ok(TransactionResult::Skipped(self.transaction_state))
            }
            TransactionState::InTransaction | TransactionState::InFailedTransaction => self
                .execute_script(statement, KeyValues::new())
                .await
                .map(TransactionResult::Complete),
        }
    }

    /// Server-side cursors are not part of this protocol version; the hook
    /// exists for interface conformance with the pooling layer.
    pub fn fetch(&mut self) -> Error {
        self.unsupported_callback("fetch")
    }

    pub fn declare_cursor(&mut self) -> Error {
        self.unsupported_callback("declare_cursor")
    }

    pub fn deallocate_cursor(&mut self) -> Error {
        self.unsupported_callback("deallocate_cursor")
    }

    fn unsupported_callback(&mut self, name: &str) -> Error {
        self.mode = Mode::Dirty;
        InterfaceError::with_message(format!(
            "{name} is not supported by this driver"
        ))
    }
}

fn build_prepared(
    codec_cache: &CodecCache,
    description: &CommandDataDescription,
) -> Result<PreparedQuery, Error> {
    let input = description
        .input()
        .map_err(ProtocolEncodingError::with_source)?;
    let output = description
        .output()
        .map_err(ProtocolEncodingError::with_source)?;
    let input_codec = input
        .build_codec(codec_cache)
        .map_err(ProtocolEncodingError::with_source)?;
    let output_codec = output
        .build_codec(codec_cache)
        .map_err(ProtocolEncodingError::with_source)?;
    Ok(PreparedQuery {
        cardinality: description.result_cardinality,
        input_typedesc_id: description.input.id,
        output_typedesc_id: description.output.id,
        input_codec,
        output_codec,
    })
}

fn encode_arguments(codec: &Arc<dyn Codec>, arguments: &Value) -> Result<Bytes, Error> {
    let mut buf = BytesMut::with_capacity(8);
    codec
        .encode(&mut buf, arguments)
        .map_err(InvalidArgumentError::with_source)?;
    Ok(buf.freeze())
}
