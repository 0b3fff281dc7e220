/*!
Client side of the SCRAM-SHA-256 exchange (RFC 5802 / RFC 7677), written as
a standalone state machine so a recorded transcript can drive it in tests.
*/

use base64::Engine;
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

pub const SCRAM_METHOD: &str = "SCRAM-SHA-256";

const RAW_NONCE_LENGTH: usize = 18;
const MINIMUM_ITERATION_COUNT: usize = 4096;
const CHANNEL_BINDING: &str = "n,,";
const KEY_LENGTH: usize = 32;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ScramError {
    #[display("malformed scram message: {_0}")]
    #[error(ignore)]
    MalformedMessage(String),
    #[display("server nonce does not extend the client nonce")]
    NonceMismatch,
    #[display("iteration count {_0} is below the minimum of 4096")]
    #[error(ignore)]
    IterationCountTooLow(usize),
    #[display("server signature verification failed")]
    SignatureMismatch,
    #[display("server returned authentication error: {_0}")]
    #[error(ignore)]
    ServerError(String),
    #[display("scram exchange is not at the expected step")]
    OutOfOrder,
}

enum Step {
    Initial,
    SentFirst {
        client_first_bare: String,
    },
    SentFinal {
        auth_message: String,
        salted_password: [u8; KEY_LENGTH],
    },
    Done,
}

/// One authentication exchange. Drive it with [client_first](ClientTransaction::client_first),
/// then feed each server payload to [server_first](ClientTransaction::server_first)
/// and [server_final](ClientTransaction::server_final) in order.
pub struct ClientTransaction {
    user: String,
    password: String,
    nonce: String,
    step: Step,
}

impl ClientTransaction {
    pub fn new(user: &str, password: &str) -> ClientTransaction {
        let raw: [u8; RAW_NONCE_LENGTH] = rand::random();
        ClientTransaction::with_nonce(
            user,
            password,
            &base64::engine::general_purpose::STANDARD.encode(raw),
        )
    }

    /// A transaction with a fixed nonce, for replaying recorded exchanges.
    pub fn with_nonce(user: &str, password: &str, nonce: &str) -> ClientTransaction {
        ClientTransaction {
            user: user.into(),
            password: password.into(),
            nonce: nonce.into(),
            step: Step::Initial,
        }
    }

    /// `client-first-message`: `n,,n=<user>,r=<nonce>`.
    pub fn client_first(&mut self) -> Result<String, ScramError> {
        if !matches!(self.step, Step::Initial) {
            return Err(ScramError::OutOfOrder);
        }
        let client_first_bare = format!(
            "n={},r={}",
            escape_name(&saslprep(&self.user)),
            self.nonce,
        );
        let message = format!("{CHANNEL_BINDING}{client_first_bare}");
        self.step = Step::SentFirst { client_first_bare };
        Ok(message)
    }

    /// Processes `server-first-message` (`r=...,s=...,i=...`) and produces
    /// `client-final-message`.
    pub fn server_first(&mut self, message: &str) -> Result<String, ScramError> {
        let Step::SentFirst { client_first_bare } = &self.step else {
            return Err(ScramError::OutOfOrder);
        };

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for field in message.split(',') {
            match field.split_once('=') {
                Some(("r", value)) => nonce = Some(value.to_string()),
                Some(("s", value)) => {
                    salt = Some(
                        base64::engine::general_purpose::STANDARD
                            .decode(value)
                            .map_err(|_| ScramError::MalformedMessage(message.into()))?,
                    )
                }
                Some(("i", value)) => {
                    iterations = Some(
                        value
                            .parse::<usize>()
                            .map_err(|_| ScramError::MalformedMessage(message.into()))?,
                    )
                }
                // extensions are allowed and ignored
                Some(_) => {}
                None => return Err(ScramError::MalformedMessage(message.into())),
            }
        }
        let (Some(nonce), Some(salt), Some(iterations)) = (nonce, salt, iterations) else {
            return Err(ScramError::MalformedMessage(message.into()));
        };
        if !nonce.starts_with(&self.nonce) || nonce.len() <= self.nonce.len() {
            return Err(ScramError::NonceMismatch);
        }
        if iterations < MINIMUM_ITERATION_COUNT {
            return Err(ScramError::IterationCountTooLow(iterations));
        }

        let salted_password = hi(saslprep(&self.password).as_bytes(), &salt, iterations);
        let client_key = hmac_sha256(&salted_password, b"Client Key");
        let stored_key = Sha256::digest(client_key);

        let client_final_without_proof = format!(
            "c={},r={}",
            base64::engine::general_purpose::STANDARD.encode(CHANNEL_BINDING),
            nonce,
        );
        let auth_message =
            format!("{client_first_bare},{message},{client_final_without_proof}");
        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());

        let mut proof = client_key;
        for (byte, signature) in proof.iter_mut().zip(client_signature) {
            *byte ^= signature;
        }

        let client_final = format!(
            "{client_final_without_proof},p={}",
            base64::engine::general_purpose::STANDARD.encode(proof),
        );
        self.step = Step::SentFinal {
            auth_message,
            salted_password,
        };
        Ok(client_final)
    }

    /// Verifies `server-final-message` (`v=<signature>`).
    pub fn server_final(&mut self, message: &str) -> Result<(), ScramError> {
        let Step::SentFinal {
            auth_message,
            salted_password,
        } = &self.step
        else {
            return Err(ScramError::OutOfOrder);
        };

        let signature = match message.split_once('=') {
            Some(("v", value)) => base64::engine::general_purpose::STANDARD
                .decode(value)
                .map_err(|_| ScramError::MalformedMessage(message.into()))?,
            Some(("e", value)) => return Err(ScramError::ServerError(value.into())),
            _ => return Err(ScramError::MalformedMessage(message.into())),
        };

        let server_key = hmac_sha256(salted_password, b"Server Key");
        let expected = hmac_sha256(&server_key, auth_message.as_bytes());
        if !constant_time_eq(&expected, &signature) {
            return Err(ScramError::SignatureMismatch);
        }
        self.step = Step::Done;
        Ok(())
    }
}

/// Unicode normalization applied to names and passwords before hashing.
fn saslprep(value: &str) -> String {
    value.nfkc().collect()
}

/// `=` and `,` are reserved inside a saslname.
fn escape_name(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; KEY_LENGTH] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("any key length works");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// `Hi(str, salt, i)`: PBKDF2-HMAC-SHA-256 with a single output block.
fn hi(password: &[u8], salt: &[u8], iterations: usize) -> [u8; KEY_LENGTH] {
    let mut block = salt.to_vec();
    block.extend_from_slice(&1u32.to_be_bytes());
    let mut current = hmac_sha256(password, &block);
    let mut result = current;
    for _ in 1..iterations {
        current = hmac_sha256(password, &current);
        for (byte, next) in result.iter_mut().zip(current) {
            *byte ^= next;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // The recorded exchange from RFC 7677, section 3.
    const USER: &str = "user";
    const PASSWORD: &str = "pencil";
    const CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &str =
        "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const CLIENT_FINAL: &str =
        "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
         p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";
    const SERVER_FINAL: &str = "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

    #[test]
    fn recorded_exchange() {
        let mut transaction = ClientTransaction::with_nonce(USER, PASSWORD, CLIENT_NONCE);
        assert_eq!(
            transaction.client_first().unwrap(),
            format!("n,,n={USER},r={CLIENT_NONCE}"),
        );
        assert_eq!(
            transaction.server_first(SERVER_FIRST).unwrap(),
            CLIENT_FINAL,
        );
        transaction.server_final(SERVER_FINAL).unwrap();
    }

    #[test]
    fn wrong_server_signature() {
        let mut transaction = ClientTransaction::with_nonce(USER, PASSWORD, CLIENT_NONCE);
        transaction.client_first().unwrap();
        transaction.server_first(SERVER_FIRST).unwrap();
        let err = transaction
            .server_final("v=bm90IHRoZSByaWdodCBzaWduYXR1cmU=")
            .unwrap_err();
        assert!(matches!(err, ScramError::SignatureMismatch));
    }

    #[test]
    fn nonce_must_extend_ours() {
        let mut transaction = ClientTransaction::with_nonce(USER, PASSWORD, CLIENT_NONCE);
        transaction.client_first().unwrap();
        let err = transaction
            .server_first("r=completely-different,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096")
            .unwrap_err();
        assert!(matches!(err, ScramError::NonceMismatch));
    }

    #[test]
    fn iteration_count_floor() {
        let mut transaction = ClientTransaction::with_nonce(USER, PASSWORD, CLIENT_NONCE);
        transaction.client_first().unwrap();
        let err = transaction
            .server_first(
                "r=rOprNGfwEbeRWgbNEkqOmore,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=1024",
            )
            .unwrap_err();
        assert!(matches!(err, ScramError::IterationCountTooLow(1024)));
    }

    #[test]
    fn names_are_escaped() {
        let mut transaction = ClientTransaction::with_nonce("a=b,c", PASSWORD, CLIENT_NONCE);
        assert_eq!(
            transaction.client_first().unwrap(),
            format!("n,,n=a=3Db=2Cc,r={CLIENT_NONCE}"),
        );
    }

    #[test]
    fn server_error_is_reported() {
        let mut transaction = ClientTransaction::with_nonce(USER, PASSWORD, CLIENT_NONCE);
        transaction.client_first().unwrap();
        transaction.server_first(SERVER_FIRST).unwrap();
        let err = transaction.server_final("e=invalid-proof").unwrap_err();
        assert!(matches!(err, ScramError::ServerError(_)));
    }
}
