/*!
The [ClientMessage] enum and related types: everything the driver can send.

```rust,ignore
pub enum ClientMessage {
    ClientHandshake(ClientHandshake),
    AuthenticationSaslInitialResponse(SaslInitialResponse),
    AuthenticationSaslResponse(SaslResponse),
    Prepare(Prepare),
    DescribeStatement(DescribeStatement),
    Execute(Execute),
    OptimisticExecute(OptimisticExecute),
    ExecuteScript(ExecuteScript),
    Flush,
    Sync,
    Terminate,
    UnknownMessage(u8, Bytes),
}
```
*/

use std::collections::HashMap;
use std::convert::TryFrom;

use bytes::{Buf, BufMut, Bytes};
use snafu::{ensure, OptionExt};
use uuid::Uuid;

pub use crate::common::{Capabilities, Cardinality, DescribeAspect, IoFormat};
use crate::encoding::{decode_key_values, encode, encode_key_values};
use crate::encoding::{Decode, Encode, Input, KeyValues, Output};
use crate::errors::{self, DecodeError, EncodeError};

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClientMessage {
    ClientHandshake(ClientHandshake),
    AuthenticationSaslInitialResponse(SaslInitialResponse),
    AuthenticationSaslResponse(SaslResponse),
    Prepare(Prepare),
    DescribeStatement(DescribeStatement),
    Execute(Execute),
    OptimisticExecute(OptimisticExecute),
    ExecuteScript(ExecuteScript),
    Flush,
    Sync,
    Terminate,
    UnknownMessage(u8, Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandshake {
    pub major_ver: u16,
    pub minor_ver: u16,
    pub params: HashMap<String, String>,
    pub extensions: HashMap<String, KeyValues>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslInitialResponse {
    pub method: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslResponse {
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepare {
    pub headers: KeyValues,
    pub io_format: IoFormat,
    pub expected_cardinality: Cardinality,
    pub statement_name: Bytes,
    pub command_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeStatement {
    pub headers: KeyValues,
    pub aspect: DescribeAspect,
    pub statement_name: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execute {
    pub headers: KeyValues,
    pub statement_name: Bytes,
    pub arguments: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticExecute {
    pub headers: KeyValues,
    pub io_format: IoFormat,
    pub expected_cardinality: Cardinality,
    pub command_text: String,
    pub input_typedesc_id: Uuid,
    pub output_typedesc_id: Uuid,
    pub arguments: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteScript {
    pub headers: KeyValues,
    pub script_text: String,
}

struct Empty;

impl ClientMessage {
    pub fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        use ClientMessage::*;
        match self {
            ClientHandshake(h) => encode(buf, 0x56, h),
            AuthenticationSaslInitialResponse(h) => encode(buf, 0x70, h),
            AuthenticationSaslResponse(h) => encode(buf, 0x72, h),
            Prepare(h) => encode(buf, 0x50, h),
            DescribeStatement(h) => encode(buf, 0x44, h),
            Execute(h) => encode(buf, 0x45, h),
            OptimisticExecute(h) => encode(buf, 0x4f, h),
            ExecuteScript(h) => encode(buf, 0x51, h),
            Flush => encode(buf, 0x48, &Empty),
            Sync => encode(buf, 0x53, &Empty),
            Terminate => encode(buf, 0x58, &Empty),

            UnknownMessage(_, _) => errors::UnknownMessageCantBeEncoded.fail()?,
        }
    }

    /// Decode exactly one frame from the buffer.
    ///
    /// Expects a full frame (tag, length, payload) to be present and fails
    /// on a trailing remainder inside the payload.
    pub fn decode(buf: &mut Input) -> Result<ClientMessage, DecodeError> {
        use self::ClientMessage as M;
        ensure!(buf.remaining() >= 5, errors::Underflow);
        let mtype = buf[0];
        let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        ensure!(len >= 4, errors::Underflow);
        ensure!(buf.remaining() >= 1 + len, errors::Underflow);
        let mut body = buf.slice(5..1 + len);
        buf.advance(1 + len);

        let result = match mtype {
            0x56 => ClientHandshake::decode(&mut body).map(M::ClientHandshake)?,
            0x70 => SaslInitialResponse::decode(&mut body).map(M::AuthenticationSaslInitialResponse)?,
            0x72 => SaslResponse::decode(&mut body).map(M::AuthenticationSaslResponse)?,
            0x50 => Prepare::decode(&mut body).map(M::Prepare)?,
            0x44 => DescribeStatement::decode(&mut body).map(M::DescribeStatement)?,
            0x45 => Execute::decode(&mut body).map(M::Execute)?,
            0x4f => OptimisticExecute::decode(&mut body).map(M::OptimisticExecute)?,
            0x51 => ExecuteScript::decode(&mut body).map(M::ExecuteScript)?,
            0x48 => M::Flush,
            0x53 => M::Sync,
            0x58 => M::Terminate,
            code => {
                let data = body.copy_to_bytes(body.remaining());
                M::UnknownMessage(code, data)
            }
        };
        ensure!(body.remaining() == 0, errors::ExtraData);
        Ok(result)
    }
}

impl Encode for Empty {
    fn encode(&self, _buf: &mut Output) -> Result<(), EncodeError> {
        Ok(())
    }
}

impl Encode for ClientHandshake {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        buf.reserve(8);
        buf.put_u16(self.major_ver);
        buf.put_u16(self.minor_ver);
        buf.put_u16(
            u16::try_from(self.params.len())
                .ok()
                .context(errors::TooManyParams)?,
        );
        for (k, v) in &self.params {
            k.encode(buf)?;
            v.encode(buf)?;
        }
        buf.reserve(2);
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

impl Decode for ClientHandshake {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 6, errors::Underflow);
        let major_ver = buf.get_u16();
        let minor_ver = buf.get_u16();
        let num_params = buf.get_u16();
        let mut params = HashMap::with_capacity(num_params.into());
        for _ in 0..num_params {
            let name = String::decode(buf)?;
            let value = String::decode(buf)?;
            params.insert(name, value);
        }
        ensure!(buf.remaining() >= 2, errors::Underflow);
        let num_ext = buf.get_u16();
        let mut extensions = HashMap::with_capacity(num_ext.into());
        for _ in 0..num_ext {
            let name = String::decode(buf)?;
            let headers = decode_key_values(buf)?;
            extensions.insert(name, headers);
        }
        Ok(ClientHandshake {
            major_ver,
            minor_ver,
            params,
            extensions,
        })
    }
}

impl Encode for SaslInitialResponse {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        self.method.encode(buf)?;
        self.data.encode(buf)?;
        Ok(())
    }
}

impl Decode for SaslInitialResponse {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let method = String::decode(buf)?;
        let data = Bytes::decode(buf)?;
        Ok(SaslInitialResponse { method, data })
    }
}

impl Encode for SaslResponse {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        self.data.encode(buf)?;
        Ok(())
    }
}

impl Decode for SaslResponse {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let data = Bytes::decode(buf)?;
        Ok(SaslResponse { data })
    }
}

impl Encode for Prepare {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        encode_key_values(buf, &self.headers)?;
        buf.reserve(10);
        buf.put_u8(self.io_format as u8);
        buf.put_u8(self.expected_cardinality as u8);
        self.statement_name.encode(buf)?;
        self.command_text.encode(buf)?;
        Ok(())
    }
}

impl Decode for Prepare {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let headers = decode_key_values(buf)?;
        ensure!(buf.remaining() >= 2, errors::Underflow);
        let io_format = TryFrom::try_from(buf.get_u8())?;
        let expected_cardinality = TryFrom::try_from(buf.get_u8())?;
        let statement_name = Bytes::decode(buf)?;
        let command_text = String::decode(buf)?;
        Ok(Prepare {
            headers,
            io_format,
            expected_cardinality,
            statement_name,
            command_text,
        })
    }
}

impl Encode for DescribeStatement {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        encode_key_values(buf, &self.headers)?;
        buf.reserve(5);
        buf.put_u8(self.aspect as u8);
        self.statement_name.encode(buf)?;
        Ok(())
    }
}

impl Decode for DescribeStatement {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let headers = decode_key_values(buf)?;
        ensure!(buf.remaining() >= 1, errors::Underflow);
        let aspect = TryFrom::try_from(buf.get_u8())?;
        let statement_name = Bytes::decode(buf)?;
        Ok(DescribeStatement {
            headers,
            aspect,
            statement_name,
        })
    }
}

impl Encode for Execute {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        encode_key_values(buf, &self.headers)?;
        self.statement_name.encode(buf)?;
        self.arguments.encode(buf)?;
        Ok(())
    }
}

impl Decode for Execute {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let headers = decode_key_values(buf)?;
        let statement_name = Bytes::decode(buf)?;
        let arguments = Bytes::decode(buf)?;
        Ok(Execute {
            headers,
            statement_name,
            arguments,
        })
    }
}

impl Encode for OptimisticExecute {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        encode_key_values(buf, &self.headers)?;
        buf.reserve(1 + 1 + 4 + 16 + 16 + 4);
        buf.put_u8(self.io_format as u8);
        buf.put_u8(self.expected_cardinality as u8);
        self.command_text.encode(buf)?;
        self.input_typedesc_id.encode(buf)?;
        self.output_typedesc_id.encode(buf)?;
        self.arguments.encode(buf)?;
        Ok(())
    }
}

impl Decode for OptimisticExecute {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let headers = decode_key_values(buf)?;
        ensure!(buf.remaining() >= 2, errors::Underflow);
        let io_format = TryFrom::try_from(buf.get_u8())?;
        let expected_cardinality = TryFrom::try_from(buf.get_u8())?;
        let command_text = String::decode(buf)?;
        let input_typedesc_id = Uuid::decode(buf)?;
        let output_typedesc_id = Uuid::decode(buf)?;
        let arguments = Bytes::decode(buf)?;
        Ok(OptimisticExecute {
            headers,
            io_format,
            expected_cardinality,
            command_text,
            input_typedesc_id,
            output_typedesc_id,
            arguments,
        })
    }
}

impl Encode for ExecuteScript {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        encode_key_values(buf, &self.headers)?;
        self.script_text.encode(buf)?;
        Ok(())
    }
}

impl Decode for ExecuteScript {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let headers = decode_key_values(buf)?;
        let script_text = String::decode(buf)?;
        Ok(ExecuteScript {
            headers,
            script_text,
        })
    }
}

impl Prepare {
    /// A prepare message with no headers for an unnamed statement.
    pub fn new(io_format: IoFormat, cardinality: Cardinality, query: &str) -> Prepare {
        Prepare {
            headers: KeyValues::new(),
            io_format,
            expected_cardinality: cardinality,
            statement_name: Bytes::from(""),
            command_text: query.into(),
        }
    }
}

impl DescribeStatement {
    pub fn data_description() -> DescribeStatement {
        DescribeStatement {
            headers: KeyValues::new(),
            aspect: DescribeAspect::DataDescription,
            statement_name: Bytes::from(""),
        }
    }
}
