/*!
The [ServerMessage] enum and related types: everything the server can send.

```rust,ignore
pub enum ServerMessage {
    ServerHandshake(ServerHandshake),
    Authentication(Authentication),
    ServerKeyData(ServerKeyData),
    ParameterStatus(ParameterStatus),
    ReadyForCommand(ReadyForCommand),
    PrepareComplete(PrepareComplete),
    CommandDataDescription(CommandDataDescription),
    Data(Data),
    CommandComplete(CommandComplete),
    ErrorResponse(ErrorResponse),
    LogMessage(LogMessage),
    DumpBlock(RawPacket),
    UnknownMessage(u8, Bytes),
}
```
*/

use std::convert::TryFrom;

use bytes::{Buf, BufMut, Bytes};
use snafu::{ensure, OptionExt};
use uuid::Uuid;

pub use crate::common::{Capabilities, Cardinality, RawTypedesc};
use crate::descriptors::Typedesc;
use crate::encoding::{decode_key_values, encode, encode_key_values};
use crate::encoding::{Decode, Encode, Input, KeyValues, Output};
use crate::errors::{self, DecodeError, EncodeError};

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServerMessage {
    ServerHandshake(ServerHandshake),
    Authentication(Authentication),
    ServerKeyData(ServerKeyData),
    ParameterStatus(ParameterStatus),
    ReadyForCommand(ReadyForCommand),
    PrepareComplete(PrepareComplete),
    CommandDataDescription(CommandDataDescription),
    Data(Data),
    CommandComplete(CommandComplete),
    ErrorResponse(ErrorResponse),
    LogMessage(LogMessage),
    // Dump packets are not decoded; they are only carried whole.
    DumpBlock(RawPacket),
    UnknownMessage(u8, Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHandshake {
    pub major_ver: u16,
    pub minor_ver: u16,
    pub extensions: Vec<(String, KeyValues)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    Ok,
    Sasl { methods: Vec<String> },
    SaslContinue { data: Bytes },
    SaslFinal { data: Bytes },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyData {
    pub data: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterStatus {
    pub name: Bytes,
    pub value: Bytes,
}

/// The transaction state reported by `ReadyForCommand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    NotInTransaction = 0x49,
    InTransaction = 0x54,
    InFailedTransaction = 0x45,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyForCommand {
    pub headers: KeyValues,
    pub transaction_state: TransactionState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareComplete {
    pub headers: KeyValues,
    pub cardinality: Cardinality,
    pub input_typedesc_id: Uuid,
    pub output_typedesc_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDataDescription {
    pub headers: KeyValues,
    pub result_cardinality: Cardinality,
    pub input: RawTypedesc,
    pub output: RawTypedesc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub data: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandComplete {
    pub headers: KeyValues,
    pub status_data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Fatal,
    Panic,
    Unknown(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub severity: ErrorSeverity,
    pub code: u32,
    pub message: String,
    pub attributes: KeyValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Debug,
    Info,
    Notice,
    Warning,
    Unknown(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub severity: MessageSeverity,
    pub code: u32,
    pub text: String,
    pub attributes: KeyValues,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub data: Bytes,
}

impl ServerMessage {
    pub fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        use ServerMessage::*;
        match self {
            ServerHandshake(h) => encode(buf, 0x76, h),
            Authentication(h) => encode(buf, 0x52, h),
            ServerKeyData(h) => encode(buf, 0x4b, h),
            ParameterStatus(h) => encode(buf, 0x53, h),
            ReadyForCommand(h) => encode(buf, 0x5a, h),
            PrepareComplete(h) => encode(buf, 0x31, h),
            CommandDataDescription(h) => encode(buf, 0x54, h),
            Data(h) => encode(buf, 0x44, h),
            CommandComplete(h) => encode(buf, 0x43, h),
            ErrorResponse(h) => encode(buf, 0x45, h),
            LogMessage(h) => encode(buf, 0x4c, h),
            DumpBlock(h) => encode(buf, 0x3d, h),

            UnknownMessage(_, _) => errors::UnknownMessageCantBeEncoded.fail()?,
        }
    }

    /// Decode exactly one frame from the buffer.
    ///
    /// Expects a full frame (tag, length, payload) to be present and fails
    /// on a trailing remainder inside the payload.
    pub fn decode(buf: &mut Input) -> Result<ServerMessage, DecodeError> {
        use self::ServerMessage as M;
        ensure!(buf.remaining() >= 5, errors::Underflow);
        let mtype = buf[0];
        let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        ensure!(len >= 4, errors::Underflow);
        ensure!(buf.remaining() >= 1 + len, errors::Underflow);
        let mut body = buf.slice(5..1 + len);
        buf.advance(1 + len);

        let result = match mtype {
            0x76 => ServerHandshake::decode(&mut body).map(M::ServerHandshake)?,
            0x52 => Authentication::decode(&mut body).map(M::Authentication)?,
            0x4b => ServerKeyData::decode(&mut body).map(M::ServerKeyData)?,
            0x53 => ParameterStatus::decode(&mut body).map(M::ParameterStatus)?,
            0x5a => ReadyForCommand::decode(&mut body).map(M::ReadyForCommand)?,
            0x31 => PrepareComplete::decode(&mut body).map(M::PrepareComplete)?,
            0x54 => CommandDataDescription::decode(&mut body).map(M::CommandDataDescription)?,
            0x44 => Data::decode(&mut body).map(M::Data)?,
            0x43 => CommandComplete::decode(&mut body).map(M::CommandComplete)?,
            0x45 => ErrorResponse::decode(&mut body).map(M::ErrorResponse)?,
            0x4c => LogMessage::decode(&mut body).map(M::LogMessage)?,
            0x3d => RawPacket::decode(&mut body).map(M::DumpBlock)?,
            code => {
                let data = body.copy_to_bytes(body.remaining());
                M::UnknownMessage(code, data)
            }
        };
        ensure!(body.remaining() == 0, errors::ExtraData);
        Ok(result)
    }
}

impl CommandDataDescription {
    pub fn input(&self) -> Result<Typedesc, DecodeError> {
        self.input.decode()
    }
    pub fn output(&self) -> Result<Typedesc, DecodeError> {
        self.output.decode()
    }
}

impl PrepareComplete {
    /// Capabilities advertised in the `0x1001` header, when present and
    /// well-formed.
    pub fn get_capabilities(&self) -> Option<Capabilities> {
        self.headers.get(&0x1001).and_then(|bytes| {
            if bytes.len() == 8 {
                let mut array = [0u8; 8];
                array.copy_from_slice(bytes);
                Some(Capabilities::from_bits_retain(u64::from_be_bytes(array)))
            } else {
                None
            }
        })
    }
}

impl Encode for ServerHandshake {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        buf.reserve(6);
        buf.put_u16(self.major_ver);
        buf.put_u16(self.minor_ver);
        buf.put_u16(
            u16::try_from(self.extensions.len())
                .ok()
                .context(errors::TooManyExtensions)?,
        );
        for (name, headers) in &self.extensions {
            name.encode(buf)?;
            encode_key_values(buf, headers)?;
        }
        Ok(())
    }
}

impl Decode for ServerHandshake {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 6, errors::Underflow);
        let major_ver = buf.get_u16();
        let minor_ver = buf.get_u16();
        let num_ext = buf.get_u16();
        let mut extensions = Vec::with_capacity(num_ext.into());
        for _ in 0..num_ext {
            let name = String::decode(buf)?;
            let headers = decode_key_values(buf)?;
            extensions.push((name, headers));
        }
        Ok(ServerHandshake {
            major_ver,
            minor_ver,
            extensions,
        })
    }
}

impl Encode for Authentication {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        use Authentication as A;
        buf.reserve(4);
        match self {
            A::Ok => buf.put_u32(0),
            A::Sasl { methods } => {
                buf.put_u32(0x0A);
                buf.reserve(4);
                buf.put_u32(
                    u32::try_from(methods.len())
                        .ok()
                        .context(errors::TooManyMethods)?,
                );
                for method in methods {
                    method.encode(buf)?;
                }
            }
            A::SaslContinue { data } => {
                buf.put_u32(0x0B);
                data.encode(buf)?;
            }
            A::SaslFinal { data } => {
                buf.put_u32(0x0C);
                data.encode(buf)?;
            }
        }
        Ok(())
    }
}

impl Decode for Authentication {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 4, errors::Underflow);
        match buf.get_u32() {
            0x00 => Ok(Authentication::Ok),
            0x0A => {
                ensure!(buf.remaining() >= 4, errors::Underflow);
                let num_methods = buf.get_u32();
                let mut methods = Vec::with_capacity(num_methods as usize);
                for _ in 0..num_methods {
                    methods.push(String::decode(buf)?);
                }
                Ok(Authentication::Sasl { methods })
            }
            0x0B => {
                let data = Bytes::decode(buf)?;
                Ok(Authentication::SaslContinue { data })
            }
            0x0C => {
                let data = Bytes::decode(buf)?;
                Ok(Authentication::SaslFinal { data })
            }
            auth_status => errors::AuthStatusInvalid { auth_status }.fail(),
        }
    }
}

impl Encode for ServerKeyData {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        buf.reserve(32);
        buf.extend(&self.data[..]);
        Ok(())
    }
}

impl Decode for ServerKeyData {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 32, errors::Underflow);
        let mut data = [0u8; 32];
        buf.copy_to_slice(&mut data);
        Ok(ServerKeyData { data })
    }
}

impl Encode for ParameterStatus {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        self.name.encode(buf)?;
        self.value.encode(buf)?;
        Ok(())
    }
}

impl Decode for ParameterStatus {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let name = Bytes::decode(buf)?;
        let value = Bytes::decode(buf)?;
        Ok(ParameterStatus { name, value })
    }
}

impl Encode for ReadyForCommand {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        encode_key_values(buf, &self.headers)?;
        buf.reserve(1);
        buf.put_u8(self.transaction_state as u8);
        Ok(())
    }
}

impl Decode for ReadyForCommand {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let headers = decode_key_values(buf)?;
        ensure!(buf.remaining() >= 1, errors::Underflow);
        let transaction_state = TryFrom::try_from(buf.get_u8())?;
        Ok(ReadyForCommand {
            headers,
            transaction_state,
        })
    }
}

impl TryFrom<u8> for TransactionState {
    type Error = DecodeError;
    fn try_from(transaction_state: u8) -> Result<TransactionState, DecodeError> {
        match transaction_state {
            0x49 => Ok(TransactionState::NotInTransaction),
            0x54 => Ok(TransactionState::InTransaction),
            0x45 => Ok(TransactionState::InFailedTransaction),
            _ => errors::InvalidTransactionState { transaction_state }.fail(),
        }
    }
}

impl Encode for PrepareComplete {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        encode_key_values(buf, &self.headers)?;
        buf.reserve(33);
        buf.put_u8(self.cardinality as u8);
        self.input_typedesc_id.encode(buf)?;
        self.output_typedesc_id.encode(buf)?;
        Ok(())
    }
}

impl Decode for PrepareComplete {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let headers = decode_key_values(buf)?;
        ensure!(buf.remaining() >= 1, errors::Underflow);
        let cardinality = TryFrom::try_from(buf.get_u8())?;
        let input_typedesc_id = Uuid::decode(buf)?;
        let output_typedesc_id = Uuid::decode(buf)?;
        Ok(PrepareComplete {
            headers,
            cardinality,
            input_typedesc_id,
            output_typedesc_id,
        })
    }
}

impl Encode for CommandDataDescription {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        encode_key_values(buf, &self.headers)?;
        buf.reserve(1);
        buf.put_u8(self.result_cardinality as u8);
        self.input.id.encode(buf)?;
        self.input.data.encode(buf)?;
        self.output.id.encode(buf)?;
        self.output.data.encode(buf)?;
        Ok(())
    }
}

impl Decode for CommandDataDescription {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let headers = decode_key_values(buf)?;
        ensure!(buf.remaining() >= 1, errors::Underflow);
        let result_cardinality = TryFrom::try_from(buf.get_u8())?;
        let proto = buf.proto().clone();
        let input_typedesc_id = Uuid::decode(buf)?;
        let input_typedesc = Bytes::decode(buf)?;
        let output_typedesc_id = Uuid::decode(buf)?;
        let output_typedesc = Bytes::decode(buf)?;
        Ok(CommandDataDescription {
            headers,
            result_cardinality,
            input: RawTypedesc {
                proto: proto.clone(),
                id: input_typedesc_id,
                data: input_typedesc,
            },
            output: RawTypedesc {
                proto,
                id: output_typedesc_id,
                data: output_typedesc,
            },
        })
    }
}

impl Encode for Data {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        buf.reserve(2);
        buf.put_u16(
            u16::try_from(self.data.len())
                .ok()
                .context(errors::TooManyElements)?,
        );
        for chunk in &self.data {
            chunk.encode(buf)?;
        }
        Ok(())
    }
}

impl Decode for Data {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 2, errors::Underflow);
        let num_chunks = buf.get_u16();
        let mut data = Vec::with_capacity(num_chunks.into());
        for _ in 0..num_chunks {
            data.push(Bytes::decode(buf)?);
        }
        Ok(Data { data })
    }
}

impl Encode for CommandComplete {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        encode_key_values(buf, &self.headers)?;
        self.status_data.encode(buf)?;
        Ok(())
    }
}

impl Decode for CommandComplete {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let headers = decode_key_values(buf)?;
        let status_data = Bytes::decode(buf)?;
        Ok(CommandComplete {
            headers,
            status_data,
        })
    }
}

impl ErrorSeverity {
    pub fn from_u8(code: u8) -> ErrorSeverity {
        use ErrorSeverity::*;
        match code {
            120 => Error,
            200 => Fatal,
            255 => Panic,
            _ => Unknown(code),
        }
    }
    pub fn to_u8(self) -> u8 {
        use ErrorSeverity::*;
        match self {
            Error => 120,
            Fatal => 200,
            Panic => 255,
            Unknown(code) => code,
        }
    }
}

impl MessageSeverity {
    pub fn from_u8(code: u8) -> MessageSeverity {
        use MessageSeverity::*;
        match code {
            20 => Debug,
            40 => Info,
            60 => Notice,
            80 => Warning,
            _ => Unknown(code),
        }
    }
    pub fn to_u8(self) -> u8 {
        use MessageSeverity::*;
        match self {
            Debug => 20,
            Info => 40,
            Notice => 60,
            Warning => 80,
            Unknown(code) => code,
        }
    }
}

impl Encode for ErrorResponse {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        buf.reserve(5);
        buf.put_u8(self.severity.to_u8());
        buf.put_u32(self.code);
        self.message.encode(buf)?;
        encode_key_values(buf, &self.attributes)?;
        Ok(())
    }
}

impl Decode for ErrorResponse {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 5, errors::Underflow);
        let severity = ErrorSeverity::from_u8(buf.get_u8());
        let code = buf.get_u32();
        let message = String::decode(buf)?;
        let attributes = decode_key_values(buf)?;
        Ok(ErrorResponse {
            severity,
            code,
            message,
            attributes,
        })
    }
}

impl Encode for LogMessage {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        buf.reserve(5);
        buf.put_u8(self.severity.to_u8());
        buf.put_u32(self.code);
        self.text.encode(buf)?;
        encode_key_values(buf, &self.attributes)?;
        Ok(())
    }
}

impl Decode for LogMessage {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 5, errors::Underflow);
        let severity = MessageSeverity::from_u8(buf.get_u8());
        let code = buf.get_u32();
        let text = String::decode(buf)?;
        let attributes = decode_key_values(buf)?;
        Ok(LogMessage {
            severity,
            code,
            text,
            attributes,
        })
    }
}

impl Encode for RawPacket {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        buf.extend(&self.data);
        Ok(())
    }
}

impl Decode for RawPacket {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        Ok(RawPacket {
            data: buf.copy_to_bytes(buf.remaining()),
        })
    }
}

impl From<ErrorResponse> for edgedb_errors::Error {
    fn from(response: ErrorResponse) -> edgedb_errors::Error {
        edgedb_errors::Error::from_code(response.code)
            .context(response.message)
            .with_attributes(response.attributes)
    }
}
