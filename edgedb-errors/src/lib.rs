/*!
Error classes for the EdgeDB client.

Every error carries a hierarchical 32-bit code. The leading non-zero bytes
of a code identify the class, so a specific server error compares `true`
against each of its containing classes:

```rust
use edgedb_errors::{Error, ProtocolError, UnsupportedProtocolVersionError};

let err = Error::from_code(0x0301_0001);
assert!(err.is::<UnsupportedProtocolVersionError>());
assert!(err.is::<ProtocolError>());
```
*/

mod error;
mod kinds;
mod traits;

pub use error::{Error, Tag};
pub use kinds::*;
pub use traits::{ErrorKind, Sealed};
