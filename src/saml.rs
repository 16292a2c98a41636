use anyhow::Context;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use crate::constants::AWS_ROLE_ATTRIBUTE;
use crate::error::{Error, Result};

/// Decoded SAML assertion
#[derive(Debug)]
pub struct SamlAssertion {
    encoded: String,
    decoded_xml: Vec<u8>,
}

/// One AWS role advertised by the assertion's role attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlRole {
    pub name: String,
    pub role_arn: String,
    pub principal_arn: String,
}

impl SamlAssertion {
    /// Create from the Base64-encoded assertion as posted by the IdP
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = STANDARD
            .decode(encoded)
            .context("Failed to decode SAML assertion from base64")?;
        Ok(Self {
            encoded: encoded.to_string(),
            decoded_xml: decoded,
        })
    }

    /// The Base64 form, as required by the issuance call
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Extract the AWS roles from the role attribute values. Each value is a
    /// comma-joined principal-ARN/role-ARN pair.
    pub fn aws_roles(&self) -> Result<Vec<SamlRole>> {
        let values = self.attribute_values(AWS_ROLE_ATTRIBUTE)?;
        let roles: Vec<SamlRole> = values.iter().filter_map(|v| SamlRole::parse_pair(v)).collect();

        if roles.is_empty() {
            return Err(Error::Selection(
                "No roles found in SAML assertion".to_string(),
            ));
        }
        Ok(roles)
    }

    /// Get attribute values by name (generic attribute extraction)
    fn attribute_values(&self, attribute_name: &str) -> Result<Vec<String>> {
        let mut reader = Reader::from_reader(self.decoded_xml.as_slice());
        reader.config_mut().trim_text(true);

        let mut values = Vec::new();
        let mut in_target_attribute = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e) | Event::Empty(ref e)) => {
                    if is_attribute_element(e.name().as_ref()) {
                        in_target_attribute = check_attribute_name(e, attribute_name);
                    }
                }
                Ok(Event::Text(e)) if in_target_attribute => {
                    values.push(String::from_utf8_lossy(e.as_ref()).to_string());
                }
                Ok(Event::End(ref e)) => {
                    if is_attribute_element(e.name().as_ref()) {
                        in_target_attribute = false;
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Other(anyhow::anyhow!(
                        "Error parsing SAML assertion: {e}"
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        if values.is_empty() {
            return Err(Error::Selection(format!(
                "No values found for attribute: {attribute_name}"
            )));
        }

        Ok(values)
    }
}

impl SamlRole {
    /// Parse a comma-joined ARN pair. The original order is
    /// principal-then-role, but either order is tolerated, keyed on the
    /// `:role/` marker.
    fn parse_pair(arn_pair: &str) -> Option<Self> {
        let (first, second) = arn_pair.split_once(',')?;
        let (first, second) = (first.trim(), second.trim());

        let (role_arn, principal_arn) = if first.contains(":role/") {
            (first.to_string(), second.to_string())
        } else {
            (second.to_string(), first.to_string())
        };

        let name = crate::creds::extract_role_name(&role_arn).to_string();

        Some(SamlRole {
            name,
            role_arn,
            principal_arn,
        })
    }
}

fn is_attribute_element(name: &[u8]) -> bool {
    matches!(name, b"Attribute" | b"saml:Attribute" | b"saml2:Attribute")
}

/// Check if the attribute element has the specified name
fn check_attribute_name(e: &BytesStart, attribute_name: &str) -> bool {
    e.attributes().filter_map(std::result::Result::ok).any(|attr| {
        attr.key.as_ref() == b"Name" && attr.value.as_ref() == attribute_name.as_bytes()
    })
}

/// Scrape the Base64 SAMLResponse value out of the IdP's auto-submit form
/// page
pub fn extract_saml_response(html: &str) -> Result<String> {
    let mut rest = html;
    while let Some(start) = rest.find("<input") {
        let tag_rest = &rest[start..];
        let end = tag_rest.find('>').unwrap_or(tag_rest.len());
        let tag = &tag_rest[..end];

        if attribute_value(tag, "name").as_deref() == Some("SAMLResponse") {
            let value = attribute_value(tag, "value")
                .context("SAMLResponse input has no value attribute")?;
            let unescaped = unescape(&value)
                .context("Failed to unescape SAMLResponse value")?
                .into_owned();
            return Ok(unescaped);
        }

        rest = &tag_rest[end..];
    }

    Err(Error::Other(anyhow::anyhow!(
        "No SAMLResponse input found in application page"
    )))
}

fn attribute_value(tag: &str, attribute: &str) -> Option<String> {
    let marker = format!("{attribute}=\"");
    let start = tag.find(&marker)? + marker.len();
    let rest = &tag[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}
