use std::collections::HashMap;
use std::error::Error;

use bytes::{Bytes, BytesMut};
use pretty_assertions::assert_eq;
use uuid::Uuid;

use edgedb_protocol::client_message::{Cardinality, IoFormat};
use edgedb_protocol::client_message::{ClientHandshake, ClientMessage};
use edgedb_protocol::client_message::{DescribeStatement, Execute, ExecuteScript};
use edgedb_protocol::client_message::{OptimisticExecute, Prepare};
use edgedb_protocol::client_message::{SaslInitialResponse, SaslResponse};
use edgedb_protocol::encoding::{Input, Output};
use edgedb_protocol::features::ProtocolVersion;

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
            ClientMessage::decode(&mut Input::new(proto, Bytes::copy_from_slice(data)))?,
            $message,
        );
    };
}

#[test]
fn client_handshake() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ClientMessage::ClientHandshake(ClientHandshake {
            major_ver: 0,
            minor_ver: 11,
            params: HashMap::new(),
            extensions: HashMap::new(),
        }),
        b"\x56\x00\x00\x00\x0C\x00\x00\x00\x0B\x00\x00\x00\x00"
    );
    encoding_eq!(
        ClientMessage::ClientHandshake(ClientHandshake {
            major_ver: 0,
            minor_ver: 11,
            params: HashMap::from([(String::from("user"), String::from("edgedb"))]),
            extensions: HashMap::new(),
        }),
        bconcat!(b"V\0\0\0\x1e\0\0\0\x0b\0\x01"
                 b"\0\0\0\x04user\0\0\0\x06edgedb\0\0")
    );
    Ok(())
}

#[test]
fn prepare() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ClientMessage::Prepare(Prepare {
            headers: HashMap::new(),
            io_format: IoFormat::Binary,
            expected_cardinality: Cardinality::Many,
            statement_name: Bytes::from(""),
            command_text: String::from("SELECT 1"),
        }),
        b"P\0\0\0\x18\0\0bm\0\0\0\0\0\0\0\x08SELECT 1"
    );
    Ok(())
}

#[test]
fn describe_statement() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ClientMessage::DescribeStatement(DescribeStatement::data_description()),
        b"D\0\0\0\x0b\0\0T\0\0\0\0"
    );
    Ok(())
}

#[test]
fn execute() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ClientMessage::Execute(Execute {
            headers: HashMap::new(),
            statement_name: Bytes::from(""),
            // empty positional-arguments envelope
            arguments: Bytes::from_static(b"\0\0\0\0"),
        }),
        b"E\0\0\0\x12\0\0\0\0\0\0\0\0\0\x04\0\0\0\0"
    );
    Ok(())
}

#[test]
fn optimistic_execute() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ClientMessage::OptimisticExecute(OptimisticExecute {
            headers: HashMap::new(),
            io_format: IoFormat::Binary,
            expected_cardinality: Cardinality::Many,
            command_text: String::from("SELECT 1"),
            input_typedesc_id: Uuid::from_u128(0xFF),
            output_typedesc_id: Uuid::from_u128(0x105),
            arguments: Bytes::from_static(b"\0\0\0\0"),
        }),
        bconcat!(b"O\0\0\0<\0\0bm\0\0\0\x08SELECT 1"
                 b"\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\xff"
                 b"\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05"
                 b"\0\0\0\x04\0\0\0\0")
    );
    Ok(())
}

#[test]
fn execute_script() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ClientMessage::ExecuteScript(ExecuteScript {
            headers: HashMap::new(),
            script_text: String::from("START TRANSACTION"),
        }),
        b"Q\0\0\0\x1b\0\0\0\0\0\x11START TRANSACTION"
    );
    Ok(())
}

#[test]
fn flush_sync_terminate() -> Result<(), Box<dyn Error>> {
    encoding_eq!(ClientMessage::Flush, b"H\0\0\0\x04");
    encoding_eq!(ClientMessage::Sync, b"S\0\0\0\x04");
    encoding_eq!(ClientMessage::Terminate, b"X\0\0\0\x04");
    Ok(())
}

#[test]
fn authentication() -> Result<(), Box<dyn Error>> {
    encoding_eq!(
        ClientMessage::AuthenticationSaslInitialResponse(SaslInitialResponse {
            method: "SCRAM-SHA-256".into(),
            data: "n,,n=tutorial,r=%NR65>7bQ2S3jzl^k$G&b1^A".into(),
        }),
        bconcat!(b"p\0\0\0A\0\0\0\rSCRAM-SHA-256"
                 b"\0\0\0(n,,n=tutorial,"
                 b"r=%NR65>7bQ2S3jzl^k$G&b1^A")
    );
    encoding_eq!(
        ClientMessage::AuthenticationSaslResponse(SaslResponse {
            data: bconcat!(b"c=biws,"
                           b"r=%NR65>7bQ2S3jzl^k$G&b1^A"
                           b"YsykYKRbp/Gli53UEElsGb4I,"
                           b"p=UNQQkuQ0m5RRy24Ovzj/"
                           b"sCevUB36WTDbGXIWbCIsJmo=")
            .clone()
            .freeze(),
        }),
        bconcat!(b"r\0\0\0p"
                 b"\0\0\0hc=biws,"
                 b"r=%NR65>7bQ2S3jzl^k$G&b1^A"
                 b"YsykYKRbp/Gli53UEElsGb4I,"
                 b"p=UNQQkuQ0m5RRy24Ovzj/"
                 b"sCevUB36WTDbGXIWbCIsJmo=")
    );
    Ok(())
}
