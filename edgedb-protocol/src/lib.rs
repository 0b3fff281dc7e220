/*!
The EdgeDB binary protocol, client side.

This crate contains the building blocks of a connection without doing any
I/O itself:

* [encoding] — primitive wire codecs and the [Encode](encoding::Encode) /
  [Decode](encoding::Decode) traits;
* [client_message] / [server_message] — the full message catalogue as
  tagged enums with per-variant encode/decode;
* [descriptors] — the type-description blobs sent by the server;
* [codec] — value codecs derived from descriptors, cached by type id;
* [value] and [model] — the dynamic value type and its scalar domains.

For a working client, see the `edgedb-tokio` crate.
*/

pub mod client_message;
pub mod codec;
pub mod common;
pub mod descriptors;
pub mod encoding;
pub mod errors;
pub mod features;
pub mod model;
pub mod server_message;
pub mod value;

pub use value::Value;
