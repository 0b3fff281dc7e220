use std::collections::HashMap;
use std::error::Error;

use bytes::{Bytes, BytesMut};
use pretty_assertions::assert_eq;
use uuid::Uuid;

use edgedb_protocol::common::{Capabilities, Cardinality, RawTypedesc};
use edgedb_protocol::encoding::{Input, Output};
use edgedb_protocol::features::ProtocolVersion;
use edgedb_protocol::server_message::{Authentication, CommandComplete};
use edgedb_protocol::server_message::{CommandDataDescription, Data, ErrorResponse};
use edgedb_protocol::server_message::{ErrorSeverity, PrepareComplete, ReadyForCommand};
use edgedb_protocol::server_message::{ParameterStatus, ServerHandshake, ServerKeyData};
use edgedb_protocol::server_message::{ServerMessage, TransactionState};

mod base;

macro_rules! encoding_eq {
    ($message: expr, $bytes: expr) => {
        let proto = ProtocolVersion::current();
        let data: &[u8] = $bytes;
        let mut bytes = BytesMut::new();
        $message.encode(&mut Output::new(&proto, &mut bytes))?;
        println!("Serialized bytes {:?}", bytes);
        let bytes = bytes.freeze();
        assert_eq!(&bytes[..], data);
        assert_eq!(
            ServerMessage::decode(&mut Input::new(proto, Bytes::copy_from_slice(data)))?,
            $message,
        );
    };
}

#[test]
fn server_handshake() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ServerMessage::ServerHandshake(ServerHandshake {
            major_ver: 0,
            minor_ver: 11,
            extensions: Vec::new(),
        }),
        b"v\0\0\0\x0a\0\0\0\x0b\0\0"
    );
    Ok(())
}

#[test]
fn authentication() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ServerMessage::Authentication(Authentication::Ok),
        b"R\0\0\0\x08\0\0\0\0"
    );
    encoding_eq!(
        ServerMessage::Authentication(Authentication::Sasl {
            methods: vec![String::from("SCRAM-SHA-256")],
        }),
        b"R\0\0\0\x1d\0\0\0\x0a\0\0\0\x01\0\0\0\rSCRAM-SHA-256"
    );
    Ok(())
}

#[test]
fn server_key_data() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ServerMessage::ServerKeyData(ServerKeyData { data: [0u8; 32] }),
        bconcat!(b"K\0\0\0\x24"
                 b"\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0"
                 b"\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0")
    );
    Ok(())
}

#[test]
fn parameter_status() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ServerMessage::ParameterStatus(ParameterStatus {
            name: Bytes::from_static(b"suggested_pool_concurrency"),
            value: Bytes::from_static(b"10"),
        }),
        bconcat!(b"S\0\0\0\x28"
                 b"\0\0\0\x1asuggested_pool_concurrency"
                 b"\0\0\0\x0210")
    );
    Ok(())
}

#[test]
fn ready_for_command() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ServerMessage::ReadyForCommand(ReadyForCommand {
            headers: HashMap::new(),
            transaction_state: TransactionState::NotInTransaction,
        }),
        b"Z\0\0\0\x07\0\0I"
    );
    encoding_eq!(
        ServerMessage::ReadyForCommand(ReadyForCommand {
            headers: HashMap::new(),
            transaction_state: TransactionState::InFailedTransaction,
        }),
        b"Z\0\0\0\x07\0\0E"
    );
    Ok(())
}

#[test]
fn prepare_complete() -> Result<(), Box<dyn Error>> {
    let message = ServerMessage::PrepareComplete(PrepareComplete {
        headers: HashMap::new(),
        cardinality: Cardinality::One,
        input_typedesc_id: Uuid::from_u128(0xFF),
        output_typedesc_id: Uuid::from_u128(0x105),
    });
    encoding_eq!(
        message,
        bconcat!(b"1\0\0\0\x27\0\0A"
                 b"\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\xff"
                 b"\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05")
    );
    Ok(())
}

#[test]
fn prepare_complete_capabilities() -> Result<(), Box<dyn Error>> {
    let message = PrepareComplete {
        headers: HashMap::from([(0x1001, Bytes::from_static(b"\0\0\0\0\0\0\0\x01"))]),
        cardinality: Cardinality::Many,
        input_typedesc_id: Uuid::from_u128(0xFF),
        output_typedesc_id: Uuid::from_u128(0x105),
    };
    assert_eq!(message.get_capabilities(), Some(Capabilities::MODIFICATIONS));
    Ok(())
}

#[test]
fn command_data_description() -> Result<(), Box<dyn Error>> {
    let proto = ProtocolVersion::current();
    let message = ServerMessage::CommandDataDescription(CommandDataDescription {
        headers: HashMap::new(),
        result_cardinality: Cardinality::AtMostOne,
        input: RawTypedesc {
            proto: proto.clone(),
            id: Uuid::from_u128(0xFF),
            // empty tuple descriptor
            data: Bytes::from_static(
                b"\x04\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\xff\0\0",
            ),
        },
        output: RawTypedesc {
            proto: proto.clone(),
            id: Uuid::from_u128(0x105),
            // std::int64 base scalar descriptor
            data: Bytes::from_static(b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05"),
        },
    });
    encoding_eq!(
        message,
        bconcat!(b"T\0\0\0\x53\0\0o"
                 b"\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\xff"
                 b"\0\0\0\x13\x04\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\xff\0\0"
                 b"\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05"
                 b"\0\0\0\x11\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05")
    );
    Ok(())
}

#[test]
fn data() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ServerMessage::Data(Data {
            data: vec![Bytes::from_static(b"?\0\0\0")],
        }),
        b"D\0\0\0\x0e\0\x01\0\0\0\x04?\0\0\0"
    );
    Ok(())
}

#[test]
fn command_complete() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ServerMessage::CommandComplete(CommandComplete {
            headers: HashMap::new(),
            status_data: Bytes::from_static(b"SELECT"),
        }),
        b"C\0\0\0\x10\0\0\0\0\0\x06SELECT"
    );
    Ok(())
}

#[test]
fn error_response() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ServerMessage::ErrorResponse(ErrorResponse {
            severity: ErrorSeverity::Error,
            code: 0x04010000,
            message: String::from("Unexpected token"),
            attributes: HashMap::new(),
        }),
        bconcat!(b"E\0\0\0\x1f"
                 b"x\x04\x01\0\0"
                 b"\0\0\0\x10Unexpected token\0\0")
    );
    Ok(())
}

#[test]
fn error_response_to_error() -> Result<(), Box<dyn Error>> {
    use edgedb_errors::{InvalidSyntaxError, QueryError};

    let err: edgedb_errors::Error = ErrorResponse {
        severity: ErrorSeverity::Error,
        code: 0x04010000,
        message: String::from("Unexpected token"),
        attributes: HashMap::new(),
    }
    .into();
    assert!(err.is::<InvalidSyntaxError>());
    assert!(err.is::<QueryError>());
    assert_eq!(err.initial_message(), Some("Unexpected token"));
    Ok(())
}
