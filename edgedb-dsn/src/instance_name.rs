use std::fmt;
use std::str::FromStr;

use crate::error::{InstanceNameError, InvalidSecretKeyError, ParseError};

const DOMAIN_LABEL_MAX_LENGTH: usize = 63;
const CLOUD_INSTANCE_NAME_MAX_LENGTH: usize = DOMAIN_LABEL_MAX_LENGTH - 2 + 1; // "--" -> "/"

/// The name of a cloud instance: an organization plus an instance within it.
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct CloudName {
    pub org_slug: String,
    pub name: String,
}

impl fmt::Display for CloudName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org_slug, self.name)
    }
}

/// A named instance: either locally linked or hosted on the cloud service.
/// Cloud names contain a `/` separating the organization from the instance.
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub enum InstanceName {
    Local(String),
    Cloud(CloudName),
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceName::Local(name) => write!(f, "{name}"),
            InstanceName::Cloud(cloud_name) => write!(f, "{cloud_name}"),
        }
    }
}

fn is_valid_local_instance_name(name: &str) -> bool {
    // Word characters separated by single dashes, no leading or trailing
    // dash: ^\w(?:-?\w)*$
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    let mut was_dash = false;
    for c in chars {
        if c == '-' {
            if was_dash {
                return false;
            } else {
                was_dash = true;
            }
        } else {
            if !c.is_ascii_alphanumeric() && c != '_' {
                return false;
            }
            was_dash = false;
        }
    }
    !was_dash
}

fn is_valid_cloud_instance_name(name: &str) -> bool {
    // Like a local name, but underscores are not allowed.
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    let mut was_dash = false;
    for c in chars {
        if c == '-' {
            if was_dash {
                return false;
            } else {
                was_dash = true;
            }
        } else {
            if !c.is_ascii_alphanumeric() {
                return false;
            }
            was_dash = false;
        }
    }
    !was_dash
}

fn is_valid_cloud_org_name(name: &str) -> bool {
    // Like a local name, but may start with a dash.
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '-' || c == '_' => {}
        _ => return false,
    }
    let mut was_dash = false;
    for c in chars {
        if c == '-' {
            if was_dash {
                return false;
            } else {
                was_dash = true;
            }
        } else {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                return false;
            }
            was_dash = false;
        }
    }
    !was_dash
}

impl FromStr for InstanceName {
    type Err = ParseError;

    fn from_str(name: &str) -> Result<InstanceName, Self::Err> {
        if let Some((org_slug, instance_name)) = name.split_once('/') {
            if !is_valid_cloud_instance_name(instance_name) {
                return Err(ParseError::InvalidInstanceName(
                    InstanceNameError::InvalidCloudInstanceName,
                ));
            }
            if !is_valid_cloud_org_name(org_slug) {
                return Err(ParseError::InvalidInstanceName(
                    InstanceNameError::InvalidCloudOrgName,
                ));
            }
            if name.len() > CLOUD_INSTANCE_NAME_MAX_LENGTH {
                return Err(ParseError::InvalidInstanceName(
                    InstanceNameError::InvalidCloudInstanceName,
                ));
            }
            Ok(InstanceName::Cloud(CloudName {
                org_slug: org_slug.into(),
                name: instance_name.into(),
            }))
        } else {
            if !is_valid_local_instance_name(name) {
                return Err(ParseError::InvalidInstanceName(
                    InstanceNameError::InvalidInstanceName,
                ));
            }
            Ok(InstanceName::Local(name.into()))
        }
    }
}

impl CloudName {
    /// Derives the instance's DNS name from the issuer recorded in the
    /// secret key's JWT claims.
    pub fn cloud_address(&self, secret_key: &str) -> Result<String, ParseError> {
        let Self { org_slug, name } = self;

        #[derive(Debug, serde::Deserialize)]
        struct Claims {
            #[serde(rename = "iss")]
            issuer: Option<String>,
        }

        use base64::Engine;
        let claims_b64 = secret_key
            .split('.')
            .nth(1)
            .ok_or(ParseError::InvalidSecretKey(
                InvalidSecretKeyError::InvalidJwt,
            ))?;
        let claims = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| ParseError::InvalidSecretKey(InvalidSecretKeyError::InvalidJwt))?;
        let claims: Claims = serde_json::from_slice(&claims)
            .map_err(|_| ParseError::InvalidSecretKey(InvalidSecretKeyError::InvalidJwt))?;
        let dns_zone = claims.issuer.ok_or(ParseError::InvalidSecretKey(
            InvalidSecretKeyError::MissingIssuer,
        ))?;
        let org_slug = org_slug.to_lowercase();
        let name = name.to_lowercase();
        let msg = format!("{org_slug}/{name}");
        let checksum = crc16::State::<crc16::XMODEM>::calculate(msg.as_bytes());
        let dns_bucket = format!("c-{:02}", checksum % 100);
        Ok(format!("{name}--{org_slug}.{dns_bucket}.i.{dns_zone}"))
    }
}

impl InstanceName {
    pub fn local(&self) -> Option<&str> {
        match self {
            InstanceName::Local(name) => Some(name),
            InstanceName::Cloud(_) => None,
        }
    }

    pub fn cloud(&self) -> Option<&CloudName> {
        match self {
            InstanceName::Local(_) => None,
            InstanceName::Cloud(cloud_name) => Some(cloud_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_and_cloud_split() {
        for inst_name in ["abc", "_localdev", "123", "a-b-c_d-e-f"] {
            match InstanceName::from_str(inst_name) {
                Ok(InstanceName::Local(name)) => assert_eq!(name, inst_name),
                other => panic!("{inst_name}: {other:?}"),
            }
        }
        for inst_name in ["abc/def", "abc-123/def-456", "_org/inst"] {
            match InstanceName::from_str(inst_name) {
                Ok(InstanceName::Cloud(CloudName { org_slug, name })) => {
                    let (o, i) = inst_name.split_once('/').unwrap();
                    assert_eq!(org_slug, o);
                    assert_eq!(name, i);
                }
                other => panic!("{inst_name}: {other:?}"),
            }
        }
        for name in [
            "",
            "-leading-dash",
            "trailing-dash-",
            "double--dash",
            "abc/_localdev",
            "with space",
        ] {
            assert!(
                InstanceName::from_str(name).is_err(),
                "unexpected success: {name}"
            );
        }
    }

    #[test]
    fn cloud_dns_derivation() {
        // secret key: unsigned JWT with {"iss": "aws.edgedb.cloud"}
        use base64::Engine;
        let claims =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{\"iss\": \"aws.edgedb.cloud\"}");
        let key = format!("edbt.{claims}.sig");
        let name: InstanceName = "my-org/my-instance".parse().unwrap();
        let address = name.cloud().unwrap().cloud_address(&key).unwrap();
        assert!(address.starts_with("my-instance--my-org.c-"), "{address}");
        assert!(address.ends_with(".i.aws.edgedb.cloud"), "{address}");
    }
}
